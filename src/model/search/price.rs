use std::str::FromStr;

use thiserror::Error;

/// The most expensive tier a search can ask for.
pub const MAX_TIER: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("price must be a whole number, got '{0}'")]
    NotANumber(String),
    #[error("price must be between 1 and {MAX_TIER}, got {0}")]
    OutOfRange(u8),
}

/// Every price tier from 1 up to a validated maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTiers(Vec<u8>);

impl PriceTiers {
    pub fn up_to(max: u8) -> Result<Self, PriceError> {
        if !(1..=MAX_TIER).contains(&max) {
            return Err(PriceError::OutOfRange(max));
        }
        Ok(Self((1..=max).collect()))
    }

    pub fn tiers(&self) -> &[u8] {
        &self.0
    }

    /// The comma separated form search providers take, e.g. "1,2,3".
    pub fn to_query_value(&self) -> String {
        self.0
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for PriceTiers {
    type Err = PriceError;

    /// Parse the maximum tier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let max = s
            .trim()
            .parse::<u8>()
            .map_err(|_| PriceError::NotANumber(s.to_string()))?;
        Self::up_to(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_run_from_one_to_max() {
        let tiers: PriceTiers = "3".parse().unwrap();
        assert_eq!(tiers.tiers(), &[1, 2, 3]);
        assert_eq!(tiers.to_query_value(), "1,2,3");
        assert_eq!(PriceTiers::up_to(1).unwrap().to_query_value(), "1");
    }

    #[test]
    fn bad_bounds_are_rejected() {
        assert_eq!("0".parse::<PriceTiers>(), Err(PriceError::OutOfRange(0)));
        assert_eq!("5".parse::<PriceTiers>(), Err(PriceError::OutOfRange(5)));
        assert!(matches!(
            "cheap".parse::<PriceTiers>(),
            Err(PriceError::NotANumber(_))
        ));
        assert!(matches!(
            "-1".parse::<PriceTiers>(),
            Err(PriceError::NotANumber(_))
        ));
    }
}
