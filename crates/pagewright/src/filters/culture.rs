//! Culture-aware number formatting.
//!
//! Only the handful of cultures below are known. Each one fixes the
//! currency symbol, its placement and the separators:
//!
//! | Culture | Example |
//! |---------|---------|
//! | `en-US` | `$11,200.00` |
//! | `en-GB` | `£11,200.00` |
//! | `fr-FR` | `11 200,00 €` (narrow no-break space groups, no-break space before `€`) |
//! | `de-DE` | `11.200,00 €` |
//! | `ja-JP` | `¥11,200` |

use super::{string_arg, FilterDef};
use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

/// Currency conventions of one culture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Culture {
    pub name: &'static str,
    pub symbol: &'static str,
    /// Text placed between the amount and a trailing symbol. `None` puts the
    /// symbol in front of the amount.
    pub symbol_suffix: Option<&'static str>,
    pub group_separator: &'static str,
    pub decimal_separator: &'static str,
    pub decimals: usize,
}

const CULTURES: &[Culture] = &[
    Culture {
        name: "en-US",
        symbol: "$",
        symbol_suffix: None,
        group_separator: ",",
        decimal_separator: ".",
        decimals: 2,
    },
    Culture {
        name: "en-GB",
        symbol: "£",
        symbol_suffix: None,
        group_separator: ",",
        decimal_separator: ".",
        decimals: 2,
    },
    Culture {
        name: "fr-FR",
        symbol: "€",
        symbol_suffix: Some("\u{a0}"),
        group_separator: "\u{202f}",
        decimal_separator: ",",
        decimals: 2,
    },
    Culture {
        name: "de-DE",
        symbol: "€",
        symbol_suffix: Some("\u{a0}"),
        group_separator: ".",
        decimal_separator: ",",
        decimals: 2,
    },
    Culture {
        name: "ja-JP",
        symbol: "¥",
        symbol_suffix: None,
        group_separator: ",",
        decimal_separator: ".",
        decimals: 0,
    },
];

impl Culture {
    /// Finds a culture by name, ignoring case and accepting `_` for `-`.
    pub fn find(name: &str) -> Option<&'static Culture> {
        let name = name.trim().replace('_', "-");
        CULTURES.iter().find(|c| c.name.eq_ignore_ascii_case(&name))
    }

    pub fn all() -> &'static [Culture] {
        CULTURES
    }
}

pub(super) fn filters() -> Vec<FilterDef> {
    vec![
        FilterDef::value("currency", 1, |ctx, value, _| currency(&value, &ctx.config().culture)),
        FilterDef::value("currency", 2, |_, value, args| {
            let culture = string_arg("currency", args, 0)?;
            currency(&value, culture)
        }),
    ]
}

fn currency(value: &Value, culture_name: &str) -> TemplateResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let amount = value
        .as_f64()
        .ok_or_else(|| TemplateError::invalid_argument(format!("currency expects a number, got {}", value.kind())))?;
    let culture = Culture::find(culture_name)
        .ok_or_else(|| TemplateError::invalid_argument(format!("unknown culture '{}'", culture_name)))?;
    Ok(Value::from(format_currency(amount, culture)))
}

/// Formats `amount` as currency in `culture`.
///
/// ```rust
/// use pagewright::filters::{format_currency, Culture};
///
/// let us = Culture::find("en-US").unwrap();
/// assert_eq!(format_currency(-1234.5, us), "-$1,234.50");
/// ```
pub fn format_currency(amount: f64, culture: &Culture) -> String {
    let fixed = format!("{:.*}", culture.decimals, amount.abs());
    let (integer, fraction) = match fixed.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (fixed.as_str(), None),
    };

    let mut number = group_digits(integer, culture.group_separator);
    if let Some(fraction) = fraction {
        number.push_str(culture.decimal_separator);
        number.push_str(fraction);
    }

    let is_negative = amount < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0');
    let sign = if is_negative { "-" } else { "" };
    match culture.symbol_suffix {
        None => format!("{}{}{}", sign, culture.symbol, number),
        Some(spacing) => format!("{}{}{}{}", sign, number, spacing, culture.symbol),
    }
}

fn group_digits(digits: &str, separator: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 * separator.len());
    let len = digits.len();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(amount: f64, culture: &str) -> String {
        format_currency(amount, Culture::find(culture).unwrap())
    }

    #[test]
    fn test_cultures() {
        assert_eq!(format(11200.0, "en-US"), "$11,200.00");
        assert_eq!(format(11200.0, "en-GB"), "£11,200.00");
        assert_eq!(format(11200.0, "fr-FR"), "11\u{202f}200,00\u{a0}€");
        assert_eq!(format(11200.0, "de-DE"), "11.200,00\u{a0}€");
        assert_eq!(format(11200.4, "ja-JP"), "¥11,200");
    }

    #[test]
    fn test_small_and_negative_amounts() {
        assert_eq!(format(0.5, "en-US"), "$0.50");
        assert_eq!(format(-1234567.891, "en-US"), "-$1,234,567.89");
        assert_eq!(format(-0.001, "en-US"), "$0.00");
        assert_eq!(format(999.0, "de-DE"), "999,00\u{a0}€");
    }

    #[test]
    fn test_culture_lookup() {
        assert_eq!(Culture::find("fr_fr").map(|c| c.name), Some("fr-FR"));
        assert!(Culture::find("xx-XX").is_none());
        assert_eq!(Culture::all().len(), 5);
    }

    #[test]
    fn test_currency_filter_values() {
        assert_eq!(currency(&Value::from("11200"), "en-US").unwrap(), Value::from("$11,200.00"));
        assert_eq!(currency(&Value::Null, "en-US").unwrap(), Value::Null);
        assert!(currency(&Value::from("abc"), "en-US").is_err());
        assert!(currency(&Value::from(1), "tlh").is_err());
    }
}
