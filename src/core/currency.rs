//! The closed set of currencies the converter understands.

use crate::core::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Supported currencies. Rates are quoted against [`Currency::BASE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Uzs,
    Usd,
    Eur,
    Gbp,
    Rub,
    Chf,
    Jpy,
    Cny,
    Kzt,
    Kgs,
    Tjs,
    Try,
    Aed,
    Krw,
    Cad,
}

impl Currency {
    /// Currency every cached rate is quoted in.
    pub const BASE: Currency = Currency::Uzs;

    pub const ALL: [Currency; 15] = [
        Currency::Uzs,
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Rub,
        Currency::Chf,
        Currency::Jpy,
        Currency::Cny,
        Currency::Kzt,
        Currency::Kgs,
        Currency::Tjs,
        Currency::Try,
        Currency::Aed,
        Currency::Krw,
        Currency::Cad,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Uzs => "UZS",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Rub => "RUB",
            Currency::Chf => "CHF",
            Currency::Jpy => "JPY",
            Currency::Cny => "CNY",
            Currency::Kzt => "KZT",
            Currency::Kgs => "KGS",
            Currency::Tjs => "TJS",
            Currency::Try => "TRY",
            Currency::Aed => "AED",
            Currency::Krw => "KRW",
            Currency::Cad => "CAD",
        }
    }

    pub fn is_base(&self) -> bool {
        *self == Self::BASE
    }

    /// All supported currencies except the base, in declaration order.
    pub fn foreign() -> impl Iterator<Item = Currency> {
        Self::ALL.into_iter().filter(|c| !c.is_base())
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or_else(|| ConversionError::InvalidCurrency(s.trim().to_string()))
    }
}
