//! Terminal output formatting.
//!
//! Pure display functions, no interaction. Everything user-facing goes
//! through here so message shapes stay consistent across commands.

use console::style;

use crate::store::{MetaValue, SettingsStore};

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a warning with a yellow marker.
pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Print the resolved settings, one `key = value` line per meaningful
/// definition, with values escaped the way they would be written in a
/// manifest.
pub fn display_settings(store: &SettingsStore) {
    for (key, value) in store.to_dict() {
        match value {
            MetaValue::Str(s) => println!("{} = {:?}", key, s),
            MetaValue::List(items) => println!("{} = {:?}", key, items),
        }
    }
}

/// Print the provenance table: every definition with all recorded entries,
/// winning entry first, losing entries marked.
pub fn display_definitions(store: &SettingsStore) {
    for definition in store.iter_ordered() {
        println!("{}:", style(&definition.key).bold());
        for (i, entry) in definition.entries().iter().enumerate() {
            let value = abbreviated(&entry.value.to_string(), 64);
            if i == 0 {
                println!("  {} ({})", value, style(&entry.source).cyan());
            } else {
                println!(
                    "  {} {} ({})",
                    style("⚠").yellow(),
                    style(&value).dim(),
                    entry.source
                );
            }
        }
    }
}

/// Print every warning accumulated during a resolution pass.
pub fn display_warnings(store: &SettingsStore) {
    for warning in store.warnings() {
        display_warning(warning);
    }
}

/// Shorten `text` to at most `max` characters, flattening newlines, with an
/// ellipsis when cut.
pub fn abbreviated(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}
