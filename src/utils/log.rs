// src/utils/log.rs

//! Report-style console output and log level parsing.
//!
//! Regular diagnostics go through the `log` macros. The helpers here print
//! the human-facing reports of the `preview`, `validate` and `info` commands.

use chrono::Local;
use ::log::LevelFilter;

const WIDTH: usize = 60;

/// Map a configured level name to a filter. Unknown names fall back to `Info`.
///
/// `WARNING` and `CRITICAL` are accepted as aliases.
pub fn level_filter(name: &str) -> LevelFilter {
    match name.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" | "critical" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Print a boxed header.
pub fn header(title: &str) {
    let border = "═".repeat(WIDTH);
    println!();
    println!("{border}");
    println!("  {title}");
    println!("{border}");
}

/// Print a separator line.
pub fn separator() {
    println!("{}", "─".repeat(WIDTH));
}

/// Print a `key: value` line.
pub fn field(key: &str, value: impl std::fmt::Display) {
    println!("{key}: {value}");
}

/// Print an indented line.
pub fn sub_item(message: &str) {
    println!("    {message}");
}

/// Print a pass/fail marker line.
pub fn status(ok: bool, message: &str) {
    let mark = if ok { "✅" } else { "❌" };
    println!("Status: {message} {mark}");
}

/// Print a summary section.
pub fn summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("[{}] [SUMMARY] {}", Local::now().format("%H:%M:%S"), title);
    for (key, value) in items {
        println!("    {key}: {value}");
    }
}
