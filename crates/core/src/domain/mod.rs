pub mod bar;
pub mod contract;
pub mod recommendation;
pub mod signal;

/// Rounds half away from zero to `dp` decimal places.
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}
