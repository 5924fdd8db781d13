//! Terminal output
//!
//! Listings and values go to stdout in the selected format. Status lines go
//! to stderr so JSON and YAML output stays machine-readable.

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Bordered table with a header row
    #[default]
    Table,
    Json,
    Yaml,
    /// One tab-separated line per row, no header
    Plain,
}

/// Rows of a listing
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                print_info("Nothing found");
                return;
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
            eprintln!("{}", format!("{} row(s)", items.len()).dimmed());
        }
        OutputFormat::Plain => {
            for item in items {
                println!("{}", item.row().join("\t"));
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_value(items, format),
    }
}

/// Serialize `value` as YAML, or as pretty JSON for every other format
pub fn print_value<T: Serialize + ?Sized>(value: &T, format: OutputFormat) {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        _ => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(text) => println!("{}", text.trim_end()),
        Err(e) => print_error(&format!("cannot render output: {}", e)),
    }
}

pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_info(message: &str) {
    eprintln!("{} {}", "•".cyan(), message);
}
