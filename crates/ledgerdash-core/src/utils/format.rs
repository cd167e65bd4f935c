use chrono::DateTime;

use crate::auth::UserProfile;

/// Format remaining seconds as `m:ss` for the session countdown.
/// Negative input shows as `0:00`.
pub fn format_countdown(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Greeting shown in the header
pub fn welcome_line(profile: Option<&UserProfile>) -> String {
    match profile.and_then(|p| p.first_name.as_deref()) {
        Some(name) => format!("Welcome, {}", name),
        None => "Welcome".to_string(),
    }
}

/// Format an epoch-seconds expiry for display
pub fn format_expiry(epoch_seconds: i64) -> String {
    match DateTime::from_timestamp(epoch_seconds, 0) {
        Some(dt) => dt.format("%b %d, %Y %H:%M UTC").to_string(),
        None => epoch_seconds.to_string(),
    }
}
