use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::{AppError, Result};

const CURRENCY_PATTERN: &str = r"R\$|US\$|[$€£¥]";

/// Normalizes locale-formatted price strings such as `R$ 1.234,56`.
///
/// When a currency symbol is present the amount after it is taken, so
/// installment text like `10x de R$ 99,90` reads as `99.90`. A number that
/// runs on past what the locale allows (`12.5`, `1.2345,67`) is rejected
/// rather than truncated.
#[derive(Debug, Clone)]
pub struct LocalePrice {
    price_regex: Regex,
    currency_regex: Regex,
    thousands_separator: char,
    decimal_separator: char,
}

impl LocalePrice {
    pub fn new(thousands_separator: char, decimal_separator: char) -> Result<Self> {
        if thousands_separator == decimal_separator {
            return Err(AppError::Validation("price separators must differ".to_string()));
        }

        let thousands = regex::escape(&thousands_separator.to_string());
        let decimal = regex::escape(&decimal_separator.to_string());
        // Grouped thousands first so `1.234,56` is not cut at the first separator.
        let pattern = format!(
            r"(?:\d{{1,3}}(?:{t}\d{{3}})+|\d+)(?:{d}\d+)?",
            t = thousands,
            d = decimal
        );
        let price_regex = Regex::new(&pattern)
            .map_err(|e| AppError::Validation(format!("invalid price pattern: {}", e)))?;
        let currency_regex = Regex::new(CURRENCY_PATTERN)
            .map_err(|e| AppError::Validation(format!("invalid currency pattern: {}", e)))?;

        Ok(Self {
            price_regex,
            currency_regex,
            thousands_separator,
            decimal_separator,
        })
    }

    /// Thousands `.`, decimal `,`.
    pub fn brazilian() -> Self {
        Self::new('.', ',').expect("static separators are distinct")
    }

    pub fn parse(&self, text: &str) -> Option<Decimal> {
        let start = self.currency_regex.find(text).map_or(0, |m| m.end());
        let found = self.price_regex.find_at(text, start)?;
        if self.runs_on(&text[found.end()..]) {
            return None;
        }

        let normalized: String = found
            .as_str()
            .chars()
            .filter(|c| *c != self.thousands_separator)
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect();
        Decimal::from_str(&normalized).ok()
    }

    /// Whether the number continues after the match: a digit, or a
    /// separator followed by a digit.
    fn runs_on(&self, rest: &str) -> bool {
        let mut chars = rest.chars();
        match chars.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some(c) if c == self.thousands_separator || c == self.decimal_separator => {
                chars.next().is_some_and(|next| next.is_ascii_digit())
            }
            _ => false,
        }
    }
}

impl Default for LocalePrice {
    fn default() -> Self {
        Self::brazilian()
    }
}
