//! Currency ledger.
//!
//! Every change to the balance goes through [`Economy::credit`] or
//! [`Economy::debit`]. The balance is unsigned and debits are
//! check-then-subtract, so the ledger can never go negative.

use serde::{Deserialize, Serialize};

use crate::entities::EntityId;
use crate::error::{GameError, Result};

/// Why currency moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Enemy killed.
    KillReward,
    /// Wave cleared.
    WaveBonus,
    /// Tower sold.
    SaleRefund,
    /// Tower placed.
    Placement,
    /// Tower upgraded.
    Upgrade,
}

/// A completed ledger entry, reported in the tick report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EconomyEvent {
    /// Balance increased.
    Credited {
        /// Amount added.
        amount: u32,
        /// Why.
        reason: LedgerReason,
        /// Entity involved, if any.
        entity: Option<EntityId>,
    },
    /// Balance decreased.
    Debited {
        /// Amount removed.
        amount: u32,
        /// Why.
        reason: LedgerReason,
        /// Entity involved, if any.
        entity: Option<EntityId>,
    },
}

/// Player economy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Economy {
    balance: u32,
    lifetime_earned: u64,
}

impl Economy {
    /// Create an economy with a starting balance. Starting funds do not count
    /// as earnings.
    #[must_use]
    pub const fn new(balance: u32) -> Self {
        Self {
            balance,
            lifetime_earned: 0,
        }
    }

    /// Current balance.
    #[must_use]
    pub const fn balance(&self) -> u32 {
        self.balance
    }

    /// Total ever credited. Never decreases.
    #[must_use]
    pub const fn lifetime_earned(&self) -> u64 {
        self.lifetime_earned
    }

    /// Check if a cost is affordable.
    #[must_use]
    pub const fn can_afford(&self, cost: u32) -> bool {
        self.balance >= cost
    }

    /// Add currency. Always succeeds.
    pub fn credit(&mut self, amount: u32) {
        self.balance = self.balance.saturating_add(amount);
        self.lifetime_earned = self.lifetime_earned.saturating_add(u64::from(amount));
    }

    /// Remove currency if available.
    ///
    /// # Errors
    ///
    /// `GameError::InsufficientFunds` if `amount` exceeds the balance; the
    /// balance is left untouched.
    pub fn debit(&mut self, amount: u32) -> Result<()> {
        if self.balance < amount {
            return Err(GameError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}
