use std::error::Error as StdError;
use std::fmt::Display;

use serde::{
    de::{self, IntoDeserializer},
    Deserialize,
};
pub use teloxide::types::Currency;

#[derive(Debug)]
pub enum CurrencyError {
    Custom(String),
}

impl Display for CurrencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurrencyError::Custom(msg) => f.write_str(msg),
        }
    }
}

impl de::Error for CurrencyError {
    fn custom<T: Display>(msg: T) -> Self {
        CurrencyError::Custom(msg.to_string())
    }
}

impl StdError for CurrencyError {}

/// Whole numbers without a fraction, anything else rounded to two decimals.
pub fn format_number(value: f64) -> String {
    let text = format!("{:.2}", value);
    text.trim_end_matches('0').trim_end_matches('.').to_owned()
}

pub trait CurrencyExt {
    /// `100 RUB` or `25.7 RUB`, at most two decimals.
    fn format_amount(&self, amount: f64) -> String;
    fn parse(currency: &str) -> Result<Self, CurrencyError>
    where
        Self: Sized;
    fn code(&self) -> String;
    /// Key of the vendor's exchange rate table, e.g. `rub/usd`.
    fn rate_key(&self) -> String;
    fn default_min(&self) -> Option<f64>;
}

impl CurrencyExt for Currency {
    fn format_amount(&self, amount: f64) -> String {
        format!("{} {}", format_number(amount), self.code())
    }

    fn parse(currency: &str) -> Result<Self, CurrencyError> {
        let normalized = currency.trim().to_uppercase();
        let de: de::value::StrDeserializer<'_, CurrencyError> =
            normalized.as_str().into_deserializer();
        Self::deserialize(de)
    }

    fn code(&self) -> String {
        format!("{:?}", self)
    }

    fn rate_key(&self) -> String {
        format!("{}/usd", self.code().to_lowercase())
    }

    fn default_min(&self) -> Option<f64> {
        match self {
            Currency::RUB => Some(25.0),
            Currency::UAH => Some(10.0),
            Currency::KZT => Some(70.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_keys() {
        assert_eq!(Currency::RUB.format_amount(100.0), "100 RUB");
        assert_eq!(Currency::KZT.format_amount(70.9), "70.9 KZT");
        assert_eq!(Currency::RUB.format_amount(25.75), "25.75 RUB");
        assert_eq!(Currency::RUB.format_amount(110.00000000000001), "110 RUB");
        assert_eq!(Currency::RUB.format_amount(0.004), "0 RUB");
        assert_eq!(Currency::UAH.rate_key(), "uah/usd");
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(<Currency as CurrencyExt>::parse(" rub ").unwrap(), Currency::RUB);
        assert!(<Currency as CurrencyExt>::parse("rubles").is_err());
    }
}
