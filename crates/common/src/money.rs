//! Money amounts in minor currency units.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
///
/// Serializes as a bare integer number of cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole-unit value.
    pub fn from_units(units: i64) -> Self {
        Self {
            cents: units.saturating_mul(100),
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after whole units).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Multiplies by a quantity, saturating at the bounds of `i64`.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.cents.checked_add(rhs.cents).map(Money::from_cents)
    }

    /// Sums amounts, returning `None` on overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-{}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "{}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
