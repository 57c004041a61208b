use near_sdk::{near, NearToken};

use crate::errors::SwapError;

/// Flat per-swap fee and the revenue it has produced so far.
///
/// Revenue is tracked apart from custody, so no settlement can ever pay it out.
#[near(serializers = [borsh])]
pub struct FeeController {
    fee: NearToken,
    collected: NearToken,
}

impl FeeController {
    pub fn new(fee: NearToken) -> Self {
        Self {
            fee,
            collected: NearToken::from_yoctonear(0),
        }
    }

    pub fn fee(&self) -> NearToken {
        self.fee
    }

    pub fn set_fee(&mut self, fee: NearToken) {
        self.fee = fee;
    }

    pub fn collected(&self) -> NearToken {
        self.collected
    }

    /// Splits a proposer's deposit into `(fee, escrowed value)` at the current fee.
    pub fn split_deposit(&self, deposit: NearToken) -> Result<(NearToken, NearToken), SwapError> {
        let value = deposit
            .checked_sub(self.fee)
            .ok_or(SwapError::InsufficientDeposit)?;
        Ok((self.fee, value))
    }

    pub fn collect(&mut self, amount: NearToken) {
        self.collected = self.collected.saturating_add(amount);
    }

    /// Empties the revenue balance and returns what it held.
    pub fn take_collected(&mut self) -> NearToken {
        std::mem::replace(&mut self.collected, NearToken::from_yoctonear(0))
    }
}
