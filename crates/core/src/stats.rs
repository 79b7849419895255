//! Shared statistical helpers.
//!
//! Pure functions used by more than one engine component. Everything here
//! is total: out-of-range inputs are clamped or return the neutral value,
//! never panic.

/// Number of equal-width belief deciles used by calibration scoring.
pub const CALIBRATION_DECILES: usize = 10;

/// Log-loss of a probability against a 0/1 outcome, with the probability
/// clamped to `[epsilon, 1 − epsilon]`.
///
/// # Examples
/// ```
/// use crowdcast_core::stats::safe_log_loss;
///
/// let ll = safe_log_loss(0.5, 1.0, 1e-6);
/// assert!((ll - std::f64::consts::LN_2).abs() < 1e-12);
/// ```
#[must_use]
pub fn safe_log_loss(prob: f64, outcome: f64, epsilon: f64) -> f64 {
    let p = prob.clamp(epsilon, 1.0 - epsilon);
    -(outcome * p.ln() + (1.0 - outcome) * (1.0 - p).ln())
}

/// Index of the equal-width decile a belief falls in, `0..=9`.
#[must_use]
pub fn decile_index(belief: f64) -> usize {
    ((belief * CALIBRATION_DECILES as f64) as usize).min(CALIBRATION_DECILES - 1)
}

/// Normalized Shannon-entropy specialization of a count distribution:
/// `1 − H / ln K`, where K is the number of non-empty groups.
///
/// A wallet concentrated in one category scores 1; a wallet spread evenly
/// over many categories approaches 0. Fewer than two groups score 1.
#[must_use]
pub fn entropy_specialization(counts: &[u64]) -> f64 {
    let groups: Vec<u64> = counts.iter().copied().filter(|&c| c > 0).collect();
    if groups.len() <= 1 {
        return 1.0;
    }
    let total: u64 = groups.iter().sum();
    let total_f = total as f64;
    let entropy: f64 = groups
        .iter()
        .map(|&c| {
            let p = c as f64 / total_f;
            -p * p.ln()
        })
        .sum();
    let max_entropy = (groups.len() as f64).ln();
    (1.0 - entropy / max_entropy).clamp(0.0, 1.0)
}

/// Weighted mean of `values` under `weights`. Returns `fallback` when the
/// total weight is not positive.
#[must_use]
pub fn weighted_mean(values: &[f64], weights: &[f64], fallback: f64) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return fallback;
    }
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total
}

/// Weighted variance of `values` around `center` under `weights`.
#[must_use]
pub fn weighted_variance(values: &[f64], weights: &[f64], center: f64) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - center).powi(2))
        .sum::<f64>()
        / total
}

/// Herfindahl concentration of a weight vector: Σ share².
///
/// 1/N for equal weights, 1.0 for a single dominant weight.
#[must_use]
pub fn herfindahl(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    weights.iter().map(|w| (w / total).powi(2)).sum()
}

/// Participation-adjusted sample count: `(Σ w)² / Σ w²`.
///
/// Equals N for equal weights and approaches 1 as one weight dominates.
#[must_use]
pub fn effective_n(weights: &[f64]) -> f64 {
    let sum: f64 = weights.iter().sum();
    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    if sum_sq <= 0.0 {
        return 0.0;
    }
    sum * sum / sum_sq
}
