//! Remittance corridors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A sender country plus the currency pair a transfer is quoted in.
///
/// Rates on a corridor are expressed as units of `quote_currency` received
/// per unit of `base_currency` sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawCorridor")]
pub struct Corridor {
    /// Country the money is sent from (e.g. "USA")
    pub sender_country: String,
    /// Currency the sender pays in
    pub base_currency: String,
    /// Currency the recipient receives
    pub quote_currency: String,
}

impl Corridor {
    /// Create a corridor, normalising currency codes to upper case
    pub fn new(
        sender_country: impl Into<String>,
        base_currency: impl Into<String>,
        quote_currency: impl Into<String>,
    ) -> Self {
        Self {
            sender_country: sender_country.into().trim().to_string(),
            base_currency: base_currency.into().trim().to_uppercase(),
            quote_currency: quote_currency.into().trim().to_uppercase(),
        }
    }

    /// The currency pair as shown to users, e.g. `USD/BDT`
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base_currency, self.quote_currency)
    }
}

#[derive(Deserialize)]
struct RawCorridor {
    sender_country: String,
    base_currency: String,
    quote_currency: String,
}

impl From<RawCorridor> for Corridor {
    fn from(raw: RawCorridor) -> Self {
        Corridor::new(raw.sender_country, raw.base_currency, raw.quote_currency)
    }
}

impl fmt::Display for Corridor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.sender_country, self.base_currency, self.quote_currency
        )
    }
}

impl FromStr for Corridor {
    type Err = Error;

    /// Parse the `<country>:<BASE>/<QUOTE>` form produced by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::validation(format!("invalid corridor '{s}', expected COUNTRY:BASE/QUOTE"));

        let (country, pair) = s.rsplit_once(':').ok_or_else(invalid)?;
        let (base, quote) = pair.split_once('/').ok_or_else(invalid)?;

        let corridor = Corridor::new(country, base, quote);
        let is_code = |c: &str| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic());
        if corridor.sender_country.is_empty()
            || !is_code(&corridor.base_currency)
            || !is_code(&corridor.quote_currency)
        {
            return Err(invalid());
        }

        Ok(corridor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trips_through_from_str() {
        let corridor = Corridor::new("Saudi Arabia", "usd", "bdt");
        assert_eq!(corridor.to_string(), "Saudi Arabia:USD/BDT");
        assert_eq!("Saudi Arabia:USD/BDT".parse::<Corridor>().unwrap(), corridor);
    }

    #[test]
    fn test_deserialize_normalises_codes() {
        let corridor: Corridor = serde_json::from_str(
            r#"{"sender_country":" USA ","base_currency":"usd","quote_currency":"bdt"}"#,
        )
        .unwrap();
        assert_eq!(corridor, Corridor::new("USA", "USD", "BDT"));
    }

    #[test]
    fn test_rejects_malformed_corridors() {
        assert!("USA-USD-BDT".parse::<Corridor>().is_err());
        assert!(":USD/BDT".parse::<Corridor>().is_err());
        assert!("USA:DOLLARS/BDT".parse::<Corridor>().is_err());
    }
}
