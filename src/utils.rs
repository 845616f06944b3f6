//! Small helpers shared by the engine and the CLI

/// Append `name` to a `/`-separated relative path
///
/// An empty parent denotes the source root.
///
/// ```rust
/// use paxcat::utils::join_relative;
///
/// assert_eq!(join_relative("", "sub"), "sub");
/// assert_eq!(join_relative("sub", "a.txt"), "sub/a.txt");
/// ```
pub fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Format a byte count with binary units
///
/// Values below 1 KiB are printed as whole bytes, larger ones with two
/// decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
