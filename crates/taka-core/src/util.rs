//! Small helpers shared across modules

/// Current Unix timestamp in milliseconds.
///
/// All persisted timestamps (record dates, queue bookkeeping, LWW
/// comparisons) use this clock.
#[must_use]
pub fn epoch_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
