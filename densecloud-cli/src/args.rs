use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use densecloud_core::FilterConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// densecloud - remove outliers from a dense point cloud using a reference mesh
#[derive(Parser, Debug)]
#[command(name = "densecloud")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Dense point cloud dataset (.json or .ply)
    #[arg(long)]
    pub input_dataset: PathBuf,

    /// Reference mesh (.obj or .ply)
    #[arg(long)]
    pub input_mesh: PathBuf,

    /// Filtered dataset (.json or .ply)
    #[arg(long)]
    pub output_dataset: PathBuf,

    /// Copy of the reference mesh, written unchanged
    #[arg(long)]
    pub output_mesh: Option<PathBuf>,

    /// JSON file with base filter parameters; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Surface tolerance in mean mesh edge lengths [default: 1.0]
    #[arg(long)]
    pub radius_factor: Option<f32>,

    /// Initial removal strength, 0 disables removal [default: 1.0]
    #[arg(long)]
    pub filter_strength: Option<f32>,

    /// Maximum points removed per pass [default: 25]
    #[arg(long)]
    pub n_points_max: Option<usize>,

    /// Neighbors used for the density estimate [default: 50]
    #[arg(long)]
    pub n_neighbors_max: Option<usize>,

    /// Number of filtering passes [default: 1]
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Strength multiplier applied after each pass [default: 1.0]
    #[arg(long)]
    pub persistence: Option<f32>,

    /// Worker threads; all cores when omitted
    #[arg(long)]
    pub threads: Option<usize>,

    /// Log verbosity
    #[arg(long, value_enum, default_value_t = VerboseLevel::Info)]
    pub verbose_level: VerboseLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerboseLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl VerboseLevel {
    /// `EnvFilter` directive for this level; tracing has no fatal level.
    pub fn as_filter(self) -> &'static str {
        match self {
            VerboseLevel::Fatal | VerboseLevel::Error => "error",
            VerboseLevel::Warning => "warn",
            VerboseLevel::Info => "info",
            VerboseLevel::Debug => "debug",
            VerboseLevel::Trace => "trace",
        }
    }
}

impl Args {
    /// Filter parameters from `--config` (or defaults) with flag overrides applied.
    pub fn filter_config(&self) -> Result<FilterConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("cannot open config file {}", path.display()))?;
                serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("cannot parse config file {}", path.display()))?
            }
            None => FilterConfig::default(),
        };

        if let Some(v) = self.radius_factor {
            config.radius_factor = v;
        }
        if let Some(v) = self.filter_strength {
            config.filter_strength = v;
        }
        if let Some(v) = self.n_points_max {
            config.n_points_max = v;
        }
        if let Some(v) = self.n_neighbors_max {
            config.n_neighbors_max = v;
        }
        if let Some(v) = self.iterations {
            config.iterations = v;
        }
        if let Some(v) = self.persistence {
            config.persistence = v;
        }

        config.validate().context("invalid filter parameters")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "densecloud",
        "--input-dataset",
        "in.json",
        "--input-mesh",
        "mesh.obj",
        "--output-dataset",
        "out.json",
    ];

    fn parse(extra: &[&str]) -> Args {
        Args::try_parse_from(REQUIRED.iter().chain(extra.iter()).copied()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.output_mesh, None);
        assert_eq!(args.verbose_level, VerboseLevel::Info);
        assert_eq!(args.filter_config().unwrap(), FilterConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "--filter-strength",
            "2.5",
            "--iterations",
            "3",
            "--persistence",
            "0.5",
            "--n-points-max",
            "100",
            "--verbose-level",
            "warning",
        ]);
        let config = args.filter_config().unwrap();

        assert_eq!(config.filter_strength, 2.5);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.persistence, 0.5);
        assert_eq!(config.n_points_max, 100);
        assert_eq!(config.n_neighbors_max, 50);
        assert_eq!(args.verbose_level.as_filter(), "warn");
    }

    #[test]
    fn test_config_file_is_base() {
        let path = std::env::temp_dir()
            .join(format!("densecloud-cli-{}-config.json", std::process::id()));
        std::fs::write(&path, r#"{"filter_strength": 4.0, "n_neighbors_max": 8}"#).unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--n-neighbors-max", "12"]);
        let config = args.filter_config().unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.filter_strength, 4.0);
        assert_eq!(config.n_neighbors_max, 12);
        assert_eq!(config.radius_factor, 1.0);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        assert!(parse(&["--radius-factor", "0"]).filter_config().is_err());
        assert!(parse(&["--n-neighbors-max", "0"]).filter_config().is_err());
    }

    #[test]
    fn test_missing_required_argument() {
        assert!(Args::try_parse_from(["densecloud", "--input-mesh", "mesh.obj"]).is_err());
    }

    #[test]
    fn test_fatal_maps_to_error() {
        assert_eq!(VerboseLevel::Fatal.as_filter(), "error");
    }
}
