//! XDG Base Directory paths for pulse.
//!
//! Embedded telemetry should use XDG paths for cross-platform consistency,
//! not platform-native paths. This matches tools like gh, docker, kubectl.

use std::path::PathBuf;

/// Get the pulse data directory.
///
/// Returns `$XDG_DATA_HOME/pulse` if set, otherwise `~/.local/share/pulse`.
/// This is where sessions, event logs, and survey state are stored.
///
/// # Examples
///
/// ```
/// use pulse_paths::data_dir;
///
/// let data = data_dir();
/// let users_dir = data.join("users");
/// ```
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("pulse")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/pulse")
    } else {
        PathBuf::from(".local/share/pulse")
    }
}

/// Turn an optional user id into a safe directory name.
///
/// Every character outside `[A-Za-z0-9-_@.]` becomes `_`; an absent or
/// empty user id maps to the literal folder `anon`. Total over all inputs,
/// so any string the host hands us produces a usable path segment.
///
/// # Examples
///
/// ```
/// use pulse_paths::sanitize_user_id;
///
/// assert_eq!(sanitize_user_id(Some("alice@example.com")), "alice@example.com");
/// assert_eq!(sanitize_user_id(Some("weird/user:name")), "weird_user_name");
/// assert_eq!(sanitize_user_id(None), "anon");
/// ```
pub fn sanitize_user_id(user_id: Option<&str>) -> String {
    match user_id {
        Some(raw) if !raw.is_empty() => raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        _ => "anon".to_string(),
    }
}
