//! Terminal output for the `nodeprep` commands.

use colored::Colorize;

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Errors go to stderr so `status --json` output stays parseable.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Indented, muted follow-up line under an item.
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Title underlined to its display width.
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Counter prefix for the `num`th of `total` software items.
pub fn item_counter(num: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("[{num:>width$}/{total}]")
}

/// One provisioning step of an item: `+` when it changed the host.
pub fn step(name: &str, applied: bool, detail: &str) {
    let mark = if applied {
        "+".green()
    } else {
        "○".dimmed()
    };
    println!("    {mark} {name:<12} {detail}");
}

/// Memory size as reported by the heap hint.
pub fn format_mb(mb: u64) -> String {
    if mb >= 1024 {
        format!("{:.1} GB", mb as f64 / 1024.0)
    } else {
        format!("{mb} MB")
    }
}

/// Keep the first four characters of a credential.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}
