//! Formatting utilities (amounts, Telegram HTML, long message splitting).

use std::sync::OnceLock;

use regex::Regex;

use crate::{domain::NodeId, errors::Error, Result};

const SATS_PER_BTC: u64 = 100_000_000;

/// Longest accepted trade or invoice expiry, in hours (one year).
pub const MAX_EXPIRY_HOURS: u32 = 8_760;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render satoshis as a BTC amount with all eight decimals, e.g. `0.00000001`.
pub fn format_tokens(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

/// Compact key for tables: first 8 and last 4 hex characters.
pub fn short_key(key: &NodeId) -> String {
    let s = key.as_str();
    format!("{}…{}", &s[..8], &s[s.len() - 4..])
}

fn tokens_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\d+)(?:\.(\d+))?\s*(k|m|btc|sats?)?$").ok())
        .as_ref()
}

/// Parse a user-entered amount into satoshis.
///
/// Accepts plain sats (`1000`, `1,000`, `1_000`, `1000 sats`), thousands and
/// millions (`1.5k`, `2m`) and BTC (`0.001btc`). Sub-satoshi amounts are rejected.
pub fn parse_tokens(input: &str) -> Result<u64> {
    let invalid = || Error::validation(format!("Not a valid amount: {}", input.trim()));

    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();
    let caps = tokens_re()
        .and_then(|re| re.captures(&cleaned))
        .ok_or_else(invalid)?;

    let whole: u128 = caps[1].parse().map_err(|_| invalid())?;
    let frac = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let multiplier: u128 = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1,
        Some(unit) if unit.starts_with("sat") => 1,
        Some(unit) if unit == "k" => 1_000,
        Some(unit) if unit == "m" => 1_000_000,
        Some(_) => u128::from(SATS_PER_BTC),
    };

    if frac.len() > 18 {
        return Err(invalid());
    }
    let scale = 10u128.pow(frac.len() as u32);
    let frac_value: u128 = if frac.is_empty() {
        0
    } else {
        frac.parse().map_err(|_| invalid())?
    };

    let scaled = frac_value * multiplier;
    if scaled % scale != 0 {
        return Err(Error::validation("Amounts below one satoshi are not supported."));
    }
    let total = whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(scaled / scale))
        .ok_or_else(invalid)?;

    u64::try_from(total).map_err(|_| invalid())
}

/// Parse an expiry given in whole hours.
pub fn parse_expiry_hours(input: &str) -> Result<u32> {
    let hours: u32 = input
        .trim()
        .trim_end_matches(['h', 'H'])
        .trim()
        .parse()
        .map_err(|_| Error::validation(format!("Not a number of hours: {}", input.trim())))?;
    if hours == 0 || hours > MAX_EXPIRY_HOURS {
        return Err(Error::validation(format!(
            "Expiry must be between 1 and {MAX_EXPIRY_HOURS} hours."
        )));
    }
    Ok(hours)
}

/// Split text into chunks of at most `limit` bytes, breaking on line boundaries.
///
/// A single line longer than `limit` is hard-split on a char boundary.
pub fn split_lines(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let extra = if current.is_empty() { line.len() } else { line.len() + 1 };
        if !current.is_empty() && current.len() + extra > limit {
            chunks.push(std::mem::take(&mut current));
        }

        let mut rest = line;
        while rest.len() > limit {
            let mut cut = limit;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut == 0 {
                cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
            }
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(rest);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn formats_btc_amounts() {
        assert_eq!(format_tokens(1), "0.00000001");
        assert_eq!(format_tokens(123_456_789), "1.23456789");
        assert_eq!(format_tokens(0), "0.00000000");
    }

    #[test]
    fn parses_amount_notations() {
        assert_eq!(parse_tokens("1000").unwrap(), 1_000);
        assert_eq!(parse_tokens(" 1,000 ").unwrap(), 1_000);
        assert_eq!(parse_tokens("1000 sats").unwrap(), 1_000);
        assert_eq!(parse_tokens("1.5k").unwrap(), 1_500);
        assert_eq!(parse_tokens("2M").unwrap(), 2_000_000);
        assert_eq!(parse_tokens("0.001btc").unwrap(), 100_000);
        assert_eq!(parse_tokens("0.00000001 BTC").unwrap(), 1);
    }

    #[test]
    fn rejects_bad_amounts() {
        for input in ["", "abc", "-5", "1.5", "0.000000001btc", "1.2.3", "99999999999999999999999"] {
            let err = parse_tokens(input).unwrap_err();
            assert_eq!(err.code(), 400, "{input:?}");
        }
    }

    #[test]
    fn expiry_hours_are_bounded() {
        assert_eq!(parse_expiry_hours("24").unwrap(), 24);
        assert_eq!(parse_expiry_hours("48h").unwrap(), 48);
        assert!(parse_expiry_hours("0").is_err());
        assert!(parse_expiry_hours("9000").is_err());
        assert!(parse_expiry_hours("soon").is_err());
    }

    #[test]
    fn splits_on_line_boundaries() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_lines(text, 9), vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(split_lines(text, 100), vec![text]);
        assert_eq!(split_lines("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(split_lines("", 10).is_empty());
    }
}
