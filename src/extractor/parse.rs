// src/extractor/parse.rs
//
// Text → number parsers for listing markup. All of them return `None`
// rather than failing; host pages change wording constantly.

use regex::Regex;
use std::sync::OnceLock;

fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*([KkMm](?:[^A-Za-z]|$))?")
            .expect("money regex")
    })
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*$").expect("number regex"))
}

fn beds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([0-9]{1,2})\s*\+?\s*(?:bds?|beds?|bedrooms?|br|bd)\b").expect("beds regex")
    })
}

fn zip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([0-9]{5})(?:-[0-9]{4})?\b").expect("zip regex"))
}

fn to_number(digits: &str) -> Option<f64> {
    digits.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `$300,000`, `$1.25M`, `$450K`, `300000`.
pub fn parse_price(text: &str) -> Option<f64> {
    let value = if let Some(caps) = money_re().captures(text) {
        let base = to_number(caps.get(1)?.as_str())?;
        let scale = match caps
            .get(2)
            .and_then(|m| m.as_str().chars().next())
            .map(|c| c.to_ascii_lowercase())
        {
            Some('k') => 1_000.0,
            Some('m') => 1_000_000.0,
            _ => 1.0,
        };
        base * scale
    } else {
        let caps = bare_number_re().captures(text)?;
        to_number(caps.get(1)?.as_str())?
    };
    (value > 0.0).then_some(value)
}

/// `3 bds`, `4 Beds`, `2bd`, `Studio` (0), or a bare `3`.
pub fn parse_bedrooms(text: &str) -> Option<u32> {
    let lower = text.to_lowercase();
    if lower.contains("studio") {
        return Some(0);
    }
    if let Some(caps) = beds_re().captures(text) {
        return caps.get(1)?.as_str().parse().ok();
    }
    let trimmed = text.trim();
    if !trimmed.is_empty() && trimmed.len() <= 2 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.parse().ok();
    }
    None
}

/// Monthly association fee. `None`/`No HOA` is a known zero; `N/A` or a
/// dash is unknown. Yearly and quarterly amounts are converted to monthly.
pub fn parse_association_fee(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let lower = lower.trim();

    if let Some(caps) = money_re().captures(lower) {
        let amount = to_number(caps.get(1)?.as_str())?;
        if amount < 0.0 {
            return None;
        }
        let per_month = if lower.contains("/yr")
            || lower.contains("year")
            || lower.contains("annual")
        {
            amount / 12.0
        } else if lower.contains("/qtr") || lower.contains("quarter") {
            amount / 3.0
        } else {
            amount
        };
        return Some(per_month);
    }

    if lower.contains("no hoa")
        || lower.ends_with("none")
        || lower.ends_with(": no")
        || lower == "no"
    {
        return Some(0.0);
    }
    None
}

/// Single spaces, no stray separators, `", "` between address parts.
pub fn join_address(chunks: &[String]) -> Option<String> {
    let joined = chunks
        .iter()
        .map(|c| c.trim().trim_end_matches(',').trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Last 5-digit group in the address (ZIP or ZIP+4).
pub fn extract_zip(address: &str) -> Option<String> {
    zip_re()
        .captures_iter(address)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
