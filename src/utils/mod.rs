//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod url;

/// Group the integer part of a number with commas, e.g. `2500.0` → `"2,500"`.
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round().max(0.0) as u64;
    let digits = rounded.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
