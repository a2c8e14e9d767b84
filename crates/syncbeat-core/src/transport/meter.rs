use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MAX_BEATS_PER_MEASURE: u32 = 16;
pub const MAX_DENOMINATOR: u32 = 32;

/// Musical meter, carried on the wire as `"N/D"`.
///
/// Only the numerator drives scheduling: it is the number of beats per
/// measure, and the accent lands on beat 1 of each measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Checked constructor.
    pub fn try_new(numerator: u32, denominator: u32) -> Result<Self> {
        let signature = Self::new(numerator, denominator);
        signature.validate()?;
        Ok(signature)
    }

    #[inline]
    pub fn beats_per_measure(&self) -> u32 {
        self.numerator
    }

    pub fn validate(&self) -> Result<()> {
        let numerator_ok = (1..=MAX_BEATS_PER_MEASURE).contains(&self.numerator);
        let denominator_ok = self.denominator.is_power_of_two() && self.denominator <= MAX_DENOMINATOR;
        if numerator_ok && denominator_ok {
            Ok(())
        } else {
            Err(Error::InvalidTimeSignature(self.to_string()))
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeSignature(s.to_string());
        let (numerator, denominator) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = numerator.trim().parse::<u32>().map_err(|_| invalid())?;
        let denominator = denominator.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::try_new(numerator, denominator).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeSignature> for String {
    fn from(value: TimeSignature) -> Self {
        value.to_string()
    }
}
