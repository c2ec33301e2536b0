//! Output formatting for CLI commands.

use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                let table = Table::new(data).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => print_single(&data, format),
    }
}

/// Print a single item in the specified format.
pub fn print_single<T: Serialize + ?Sized>(data: &T, _format: OutputFormat) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Color a unit or job status for terminal output.
pub fn colorize_status(status: &str) -> ColoredString {
    match status {
        "successful" | "completed" => status.green(),
        "failed" | "timeout" | "canceled" => status.red(),
        "starting" | "running" => status.yellow(),
        "init" => status.dimmed(),
        other => other.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("table"), OutputFormat::Table);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Table);
    }

    #[test]
    fn test_colorize_keeps_text() {
        for status in ["successful", "failed", "running", "init", "unreachable"] {
            assert!(colorize_status(status).to_string().contains(status));
        }
    }
}
