//! Splits a date range into search windows small enough to stay under the
//! per-query result cap.

use chrono::{DateTime, Duration, Utc};
use harvest_core::{CoreError, TimeWindow};

/// Gap between one window's end and the next window's start. Window bounds
/// are inclusive, so neighbours must not share a second.
pub fn epsilon() -> Duration {
    Duration::seconds(1)
}

/// Windows of width `fine_scale` covering `[start, end]`, the last one clipped
/// to `end`. `start == end` yields a single zero-width window.
pub fn plan(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    fine_scale: Duration,
) -> Result<Vec<TimeWindow>, CoreError> {
    if start > end {
        return Err(CoreError::invalid_input(format!(
            "Start {} is after end {}",
            start, end
        )));
    }
    if fine_scale <= Duration::zero() {
        return Err(CoreError::invalid_input(format!(
            "Window size must be positive, got {}",
            fine_scale
        )));
    }

    let mut windows = Vec::new();
    let mut window_start = start;
    while window_start <= end {
        let window_end = match window_start.checked_add_signed(fine_scale) {
            Some(candidate) if candidate < end => candidate,
            _ => end,
        };
        windows.push(TimeWindow::new(window_start, window_end));
        window_start = window_end + epsilon();
    }

    Ok(windows)
}

/// Window width for a size given in whole hours. Sizes chrono cannot
/// represent are rejected instead of overflowing.
pub fn window_size(hours: u64) -> Result<Duration, CoreError> {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .ok_or_else(|| {
            CoreError::invalid_input(format!("Window size of {} hours is too large", hours))
        })
}
