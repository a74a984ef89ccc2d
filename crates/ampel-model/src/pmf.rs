//! Probability-mass-function helpers.

/// Tolerance for PMF sum checks.
pub const EPSILON: f64 = 1.0e-5;

/// Whether two values are equal within [`EPSILON`].
pub fn is_near(value: f64, reference: f64) -> bool {
    (value - reference).abs() < EPSILON
}

/// Whether the vector is a probability mass function: all entries finite
/// and non-negative, summing to 1 within tolerance.
pub fn is_pmf(probabilities: &[f64]) -> bool {
    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return false;
    }
    is_near(probabilities.iter().sum(), 1.0)
}

/// Normalize a count histogram into a PMF.
///
/// An all-zero histogram yields non-finite entries; callers are expected
/// to reject such vectors via [`is_pmf`].
pub fn pmf_from_counts(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    counts
        .iter()
        .map(|&c| c as f64 / total as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn uniform_vector_is_a_pmf() {
        assert!(is_pmf(&[0.25; 4]));
        assert!(is_pmf(&[1.0]));
    }

    #[test]
    fn rejects_bad_vectors() {
        assert!(!is_pmf(&[0.5, 0.4]));
        assert!(!is_pmf(&[0.5, f64::NAN]));
        assert!(!is_pmf(&[1.5, -0.5]));
        assert!(!is_pmf(&[]));
    }

    #[test]
    fn zero_histogram_is_rejected_downstream() {
        let pmf = pmf_from_counts(&[0, 0]);
        assert!(!is_pmf(&pmf));
    }

    proptest! {
        #[test]
        fn nonzero_histograms_normalize_to_a_pmf(counts in prop::collection::vec(0u64..10_000, 1..8)) {
            prop_assume!(counts.iter().sum::<u64>() > 0);
            prop_assert!(is_pmf(&pmf_from_counts(&counts)));
        }
    }
}
