//! Money and period value objects (§4.1).

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Rub,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Eur => write!(f, "EUR"),
            Currency::Rub => write!(f, "RUB"),
        }
    }
}

/// A fixed-point amount tagged with a currency. Arithmetic across differing
/// currencies is a hard error — this crate does not perform conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Round half-up to two decimal places, the rounding strategy used
    /// everywhere the spec calls for currency rounding (promo discounts,
    /// proration, refunds).
    pub fn round_half_up(&self) -> Self {
        Self {
            amount: self.amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            currency: self.currency,
        }
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, Error> {
        self.require_same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, Error> {
        self.require_same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency))
    }

    pub fn mul_scalar(&self, factor: Decimal) -> Money {
        Money::new(self.amount * factor, self.currency)
    }

    pub fn negate(&self) -> Money {
        Money::new(-self.amount, self.currency)
    }

    pub fn min(&self, other: &Money) -> Result<Money, Error> {
        self.require_same_currency(other)?;
        Ok(if self.amount <= other.amount { *self } else { *other })
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), Error> {
        if self.currency != other.currency {
            return Err(Error::invalid_input(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// A duration expressed the way plans and retry schedules express it:
/// a count plus a calendar-naive unit. `to_days` maps months -> 30 and
/// years -> 365, a stated simplification (§4.1, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub value: i64,
    pub unit: TimeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Months,
    Years,
}

impl TimePeriod {
    pub fn days(value: i64) -> Self {
        Self { value, unit: TimeUnit::Days }
    }

    pub fn months(value: i64) -> Self {
        Self { value, unit: TimeUnit::Months }
    }

    pub fn years(value: i64) -> Self {
        Self { value, unit: TimeUnit::Years }
    }

    pub fn to_days(&self) -> i64 {
        match self.unit {
            TimeUnit::Days => self.value,
            TimeUnit::Months => self.value * 30,
            TimeUnit::Years => self.value * 365,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_cross_currency_arithmetic() {
        let a = Money::new(dec!(10), Currency::Usd);
        let b = Money::new(dec!(5), Currency::Eur);
        assert!(a.checked_add(&b).is_err());
    }

    #[test]
    fn rounds_half_up_to_two_decimals() {
        let m = Money::new(dec!(666.665), Currency::Rub);
        assert_eq!(m.round_half_up().amount(), dec!(666.67));
    }

    #[test]
    fn time_period_to_days() {
        assert_eq!(TimePeriod::months(1).to_days(), 30);
        assert_eq!(TimePeriod::years(1).to_days(), 365);
        assert_eq!(TimePeriod::days(10).to_days(), 10);
    }
}
