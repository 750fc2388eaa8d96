/// Convert an American price (+150, -110) to its decimal multiplier (2.50, 1.909).
pub fn american_to_decimal(price: f64) -> f64 {
    if price >= 100.0 {
        1.0 + price / 100.0
    } else if price <= -100.0 {
        1.0 + 100.0 / price.abs()
    } else {
        // Prices inside (-100, 100) are not quotable; treat as even money.
        2.0
    }
}

/// Convert a decimal multiplier back to an American price.
pub fn decimal_to_american(decimal: f64) -> f64 {
    if decimal <= 1.0 {
        return 0.0;
    }
    if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    }
}

/// Implied win probability of an American price, vig included.
pub fn implied_probability(price: f64) -> f64 {
    1.0 / american_to_decimal(price)
}

/// Combined decimal multiplier of a set of American leg prices.
pub fn parlay_decimal_price(prices: &[f64]) -> f64 {
    prices.iter().map(|p| american_to_decimal(*p)).product()
}

/// Format an American price with its sign, e.g. "+150" or "-110".
pub fn format_american(price: f64) -> String {
    if price > 0.0 {
        format!("+{:.0}", price)
    } else {
        format!("{:.0}", price)
    }
}

/// Format an optional line such as a spread: "-1.5", "+1.5", "6.5".
pub fn format_line(line: Option<f64>, signed: bool) -> String {
    match line {
        Some(l) if signed && l > 0.0 => format!("+{:.1}", l),
        Some(l) => format!("{:.1}", l),
        None => "-".to_string(),
    }
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Validate team name format
pub fn validate_team_name(name: &str) -> bool {
    !name.trim().is_empty() && name.len() <= 100
}

/// Derive a short abbreviation from a team name ("Boston Bruins" -> "BB").
pub fn abbreviate(name: &str) -> String {
    let abbr: String = name
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .filter(|c| c.is_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(3)
        .collect();
    if abbr.is_empty() {
        "UNK".to_string()
    } else {
        abbr
    }
}
