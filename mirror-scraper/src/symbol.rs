//! Ticker normalization.
//!
//! The portfolio page writes share classes with a dot (`BRK.B`), the trading
//! terminal with a space (`BRK B`). Records always carry the dotted form.

const MAX_SYMBOL_LEN: usize = 10;

/// Normalize a raw ticker token into canonical uppercase form.
///
/// Returns `None` unless the result looks like a tradable ticker: ASCII
/// letters and digits, optionally split by single dots, with at least one
/// letter.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw
        .split(|c: char| c.is_whitespace() || c == '-' || c == '/')
        .filter(|part| !part.is_empty())
        .collect();

    // A second part is only accepted as a share class suffix
    match parts.as_slice() {
        [_] => {}
        [_, class] if class.len() <= 2 => {}
        _ => return None,
    }
    let symbol = parts.join(".").to_ascii_uppercase();

    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return None;
    }
    if symbol.starts_with('.') || symbol.ends_with('.') || symbol.contains("..") {
        return None;
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return None;
    }
    if !symbol.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(symbol)
}

/// Convert a canonical symbol to the terminal's contract symbol.
pub fn broker_symbol(symbol: &str) -> String {
    symbol.replace('.', " ")
}
