// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number cleaning and validation.

use despacho_core::DespachoError;

/// Country calling code and the allowed national number length.
struct CountryRule {
    code: &'static str,
    min: usize,
    max: usize,
}

const COUNTRIES: &[CountryRule] = &[
    CountryRule { code: "57", min: 10, max: 10 },
    CountryRule { code: "1", min: 10, max: 10 },
    CountryRule { code: "34", min: 9, max: 9 },
    CountryRule { code: "55", min: 10, max: 11 },
];

const FALLBACK_MIN: usize = 7;
const FALLBACK_MAX: usize = 15;

/// Normalize `raw` to the digit string the provider expects.
///
/// Separators (whitespace, `-`, `(`, `)`) are dropped, then a leading `+`
/// or `00`. Known country codes enforce their national length; any other
/// number must be 7 to 15 digits long.
pub fn clean_phone(raw: &str) -> Result<String, DespachoError> {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();
    let digits = stripped
        .strip_prefix('+')
        .or_else(|| stripped.strip_prefix("00"))
        .unwrap_or(&stripped);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DespachoError::InvalidPhone(raw.to_string()));
    }

    let valid = match COUNTRIES.iter().find(|c| digits.starts_with(c.code)) {
        Some(rule) => {
            let national = digits.len() - rule.code.len();
            (rule.min..=rule.max).contains(&national)
        }
        None => (FALLBACK_MIN..=FALLBACK_MAX).contains(&digits.len()),
    };
    if !valid {
        return Err(DespachoError::InvalidPhone(raw.to_string()));
    }
    Ok(digits.to_string())
}
