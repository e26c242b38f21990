//! User-facing terminal messages
//!
//! Kept apart from logging so users see plain colored text instead of
//! timestamps, levels and module paths.

use owo_colors::OwoColorize;

/// Display a warning message to the user in yellow with padding
///
/// # Example
/// ```ignore
/// output::warn("No images matched; try a shorter keyword.");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Display an error message to the user in red with padding
///
/// # Example
/// ```ignore
/// output::error("Originals directory not found. Check [paths] in config.toml.");
/// ```
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Display an informational message to the user in default color with padding
pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}

/// Display a success message to the user in green
pub fn success(message: &str) {
    eprintln!("{}", message.green());
}
