//! Outlier decision policy

use rayon::prelude::*;

/// Keep/remove classification of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierDecision {
    /// Score above which a point is a removal candidate
    pub threshold: f32,
    /// `keep[i]` is false for every removed point
    pub keep: Vec<bool>,
    /// Number of points whose score exceeded the threshold
    pub candidates: usize,
    /// Number of points actually removed
    pub removed: usize,
}

/// Removal threshold for a pass at `strength`.
///
/// Decreases as the strength grows; a strength of (almost) zero yields an
/// infinite threshold, so nothing is removed.
pub fn removal_threshold(radius_factor: f32, strength: f32) -> f32 {
    if strength > f32::EPSILON {
        radius_factor / strength
    } else {
        f32::INFINITY
    }
}

/// Classify points from their scores.
///
/// Every point scoring above the threshold is a candidate. When there are
/// more than `n_points_max` candidates, only the `n_points_max` highest
/// scores are removed, ties going to the lower index.
pub fn decide(
    scores: &[f32],
    radius_factor: f32,
    strength: f32,
    n_points_max: usize,
) -> OutlierDecision {
    let threshold = removal_threshold(radius_factor, strength);

    let mut candidates: Vec<usize> = scores
        .par_iter()
        .enumerate()
        .filter(|(_, &score)| score > threshold)
        .map(|(index, _)| index)
        .collect();
    let candidate_count = candidates.len();

    let by_score = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
    if candidates.len() > n_points_max {
        if n_points_max == 0 {
            candidates.clear();
        } else {
            candidates.select_nth_unstable_by(n_points_max - 1, by_score);
            candidates.truncate(n_points_max);
        }
    }

    let mut keep = vec![true; scores.len()];
    for &index in &candidates {
        keep[index] = false;
    }

    OutlierDecision {
        threshold,
        keep,
        candidates: candidate_count,
        removed: candidates.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_decreases_with_strength() {
        assert_eq!(removal_threshold(1.0, 1.0), 1.0);
        assert_eq!(removal_threshold(1.0, 2.0), 0.5);
        assert_eq!(removal_threshold(2.0, 0.5), 4.0);
        assert!(removal_threshold(1.0, 0.0).is_infinite());
    }

    #[test]
    fn test_zero_strength_removes_nothing() {
        let scores = vec![0.0, 1e9, f32::MAX];
        let decision = decide(&scores, 1.0, 0.0, 10);
        assert_eq!(decision.removed, 0);
        assert!(decision.keep.iter().all(|&k| k));
    }

    #[test]
    fn test_cap_keeps_highest_scores() {
        let scores = vec![5.0, 9.0, 2.0, 7.0, 9.0, 0.1];
        let decision = decide(&scores, 1.0, 1.0, 3);

        assert_eq!(decision.candidates, 5);
        assert_eq!(decision.removed, 3);
        assert_eq!(decision.keep, vec![true, false, true, false, false, true]);
    }

    #[test]
    fn test_ties_prefer_lower_index() {
        let scores = vec![4.0, 4.0, 4.0, 4.0];
        let decision = decide(&scores, 1.0, 1.0, 2);
        assert_eq!(decision.keep, vec![false, false, true, true]);
    }

    #[test]
    fn test_monotone_in_strength() {
        let scores: Vec<f32> = (0..200).map(|i| (i as f32 * 0.37).sin().abs() * 4.0).collect();
        let mut previous = 0;
        for strength in [0.0, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 16.0] {
            let removed = decide(&scores, 1.0, strength, 40).removed;
            assert!(removed >= previous);
            assert!(removed <= 40);
            previous = removed;
        }
        assert_eq!(previous, 40);
    }

    #[test]
    fn test_empty_scores() {
        let decision = decide(&[], 1.0, 1.0, 5);
        assert_eq!(decision.removed, 0);
        assert!(decision.keep.is_empty());
    }
}
