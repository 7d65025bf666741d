//! Network-driven quality estimation.
//!
//! Each observation of the link status nudges the accuracy/delay estimate.
//! The mapping is pure; callers keep the running `QualityMetrics`.

use sentiment_core::{NetworkStatus, QualityMetrics};

/// Accuracy floor while the link is weak.
pub const WEAK_ACCURACY_FLOOR: f64 = 20.0;

/// Adjust `metrics` for one observation of `status`.
///
/// | status  | accuracy              | delay             |
/// |---------|-----------------------|-------------------|
/// | offline | `max(0, a - 0.5)`     | `d + 1000`        |
/// | weak    | `max(20, a - 0.1)`    | `d + 200`         |
/// | online  | `min(100, a + 0.1)`   | `max(0, d - 50)`  |
pub fn adjust(status: NetworkStatus, metrics: QualityMetrics) -> QualityMetrics {
    let QualityMetrics {
        data_accuracy,
        real_time_delay_ms,
    } = metrics;

    match status {
        NetworkStatus::Offline => QualityMetrics {
            data_accuracy: (data_accuracy - 0.5).max(QualityMetrics::MIN_ACCURACY),
            real_time_delay_ms: real_time_delay_ms + 1000.0,
        },
        NetworkStatus::Weak => QualityMetrics {
            data_accuracy: (data_accuracy - 0.1).max(WEAK_ACCURACY_FLOOR),
            real_time_delay_ms: real_time_delay_ms + 200.0,
        },
        NetworkStatus::Online => QualityMetrics {
            data_accuracy: (data_accuracy + 0.1).min(QualityMetrics::MAX_ACCURACY),
            real_time_delay_ms: (real_time_delay_ms - 50.0).max(0.0),
        },
    }
}
