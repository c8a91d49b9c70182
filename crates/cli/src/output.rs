//! Output formatting for CLI

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Format a list of items
pub fn format_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                return "No items found.".to_string();
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
        OutputFormat::Plain => items
            .iter()
            .map(|item| {
                T::headers()
                    .iter()
                    .zip(item.row())
                    .map(|(header, value)| format!("{}: {}", header, value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n---\n"),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    println!("{}", format_list(items, format));
}

/// Print a progress step with its icon
pub fn print_step(icon: &str, message: &str) {
    println!("{} {}", icon, message);
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

/// Print an indented hint block on stderr
pub fn print_hint(lines: &[String]) {
    for line in lines {
        if line.is_empty() {
            eprintln!();
        } else {
            eprintln!("   {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: String,
        asn: u32,
    }

    impl TableDisplay for Row {
        fn headers() -> Vec<&'static str> {
            vec!["Name", "ASN"]
        }

        fn row(&self) -> Vec<String> {
            vec![self.name.clone(), self.asn.to_string()]
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "ixpfra01".to_string(), asn: 215011 },
            Row { name: "ixpams01".to_string(), asn: 215011 },
        ]
    }

    #[test]
    fn test_plain_format() {
        assert_eq!(
            format_list(&rows(), OutputFormat::Plain),
            "Name: ixpfra01\nASN: 215011\n---\nName: ixpams01\nASN: 215011"
        );
    }

    #[test]
    fn test_json_format() {
        let value: serde_json::Value =
            serde_json::from_str(&format_list(&rows(), OutputFormat::Json)).unwrap();
        assert_eq!(value[1]["name"], "ixpams01");
    }

    #[test]
    fn test_table_format() {
        let table = format_list(&rows(), OutputFormat::Table);
        assert!(table.contains("ixpfra01"));
        assert!(table.contains("ASN"));
        assert_eq!(format_list::<Row>(&[], OutputFormat::Table), "No items found.");
    }
}
