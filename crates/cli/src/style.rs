//! Shared styling utilities for terminal output.

use console::Style;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Secret status label for config summaries.
pub fn secret_state(resolved: bool) -> String {
    if resolved {
        Style::new().green().apply_to("set").to_string()
    } else {
        Style::new().red().bold().apply_to("NOT SET").to_string()
    }
}

/// Banner printed before every command unless `--no-logo` is given.
pub fn logo() -> String {
    let style = Style::new().cyan().bold();
    format!(
        "{}\n{}",
        style.apply_to(r#"  _               _
 | |__  _ __ ___ | | _____
 | '_ \| '__/ _ \| |/ / _ \
 | |_) | | | (_) |   <  __/
 |_.__/|_|  \___/|_|\_\___|"#),
        dim(concat!("  identity broker v", env!("CARGO_PKG_VERSION")))
    )
}
