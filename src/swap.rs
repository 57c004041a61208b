use near_sdk::{env, near, AccountId, NearToken};

use crate::asset::{AssetRef, Delivery};

// Unique identifier for a swap, handed out by `IdAllocator`.
pub type SwapId = u64;

// Implicit account made of zeros. Stands in for "no account" in the default record.
pub const ZERO_ACCOUNT_ID: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[near(serializers = [json, borsh])]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwapState {
    /// Never stored. Reported for closed and never-created swaps.
    #[default]
    Closed,
    /// Proposer's bundle is in custody, waiting for the counterparty.
    Created,
    /// Counterparty's pulls are in flight; the record is locked.
    Funding,
    /// Both bundles are in custody, ready to settle.
    Funded,
}

// A single swap between a proposer and the counterparty they named.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq)]
pub struct Swap {
    pub id: SwapId,
    pub proposer_id: AccountId,
    pub counterparty_id: AccountId,
    pub proposer_assets: Vec<AssetRef>,
    pub proposer_value: NearToken,
    pub counterparty_assets: Vec<AssetRef>,
    pub counterparty_value: NearToken,
    pub fee: NearToken, // withheld from the proposer's deposit at creation
    pub state: SwapState,
}

impl Swap {
    pub fn new(
        id: SwapId,
        proposer_id: AccountId,
        counterparty_id: AccountId,
        proposer_assets: Vec<AssetRef>,
        proposer_value: NearToken,
        fee: NearToken,
    ) -> Self {
        Self {
            id,
            proposer_id,
            counterparty_id,
            proposer_assets,
            proposer_value,
            counterparty_assets: Vec::new(),
            counterparty_value: NearToken::from_yoctonear(0),
            fee,
            state: SwapState::Created,
        }
    }

    /// Cross-delivery of a funded swap: the proposer receives the
    /// counterparty's bundle first, then the counterparty receives the
    /// proposer's.
    pub fn settlement_deliveries(&self) -> Vec<Delivery> {
        let mut deliveries = Delivery::bundle(
            &self.proposer_id,
            &self.counterparty_assets,
            self.counterparty_value,
        );
        deliveries.extend(Delivery::bundle(
            &self.counterparty_id,
            &self.proposer_assets,
            self.proposer_value,
        ));
        deliveries
    }

    /// Everything the proposer deposited, back to the proposer.
    pub fn refund_deliveries(&self) -> Vec<Delivery> {
        Delivery::bundle(&self.proposer_id, &self.proposer_assets, self.proposer_value)
    }
}

impl Default for Swap {
    fn default() -> Self {
        let zero: AccountId = ZERO_ACCOUNT_ID
            .parse()
            .unwrap_or_else(|_| env::panic_str("Invalid zero account id"));
        Self {
            id: 0,
            proposer_id: zero.clone(),
            counterparty_id: zero,
            proposer_assets: Vec::new(),
            proposer_value: NearToken::from_yoctonear(0),
            counterparty_assets: Vec::new(),
            counterparty_value: NearToken::from_yoctonear(0),
            fee: NearToken::from_yoctonear(0),
            state: SwapState::Closed,
        }
    }
}

/// Hands out swap ids. The counter only moves forward.
#[near(serializers = [borsh])]
#[derive(Default)]
pub struct IdAllocator {
    last_id: SwapId,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> SwapId {
        self.last_id = self
            .last_id
            .checked_add(1)
            .unwrap_or_else(|| env::panic_str("Swap id space exhausted"));
        self.last_id
    }

    pub fn last_id(&self) -> SwapId {
        self.last_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> AccountId {
        id.parse().unwrap()
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.last_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
        assert_eq!(ids.last_id(), 3);
    }

    #[test]
    fn test_default_record_is_zero_valued() {
        let swap = Swap::default();
        assert_eq!(swap.id, 0);
        assert_eq!(swap.proposer_id.as_str(), ZERO_ACCOUNT_ID);
        assert_eq!(swap.counterparty_id.as_str(), ZERO_ACCOUNT_ID);
        assert!(swap.proposer_assets.is_empty());
        assert!(swap.counterparty_assets.is_empty());
        assert_eq!(swap.proposer_value.as_yoctonear(), 0);
        assert_eq!(swap.state, SwapState::Closed);
    }

    #[test]
    fn test_settlement_crosses_bundles() {
        let nft: AccountId = account("nft.near");
        let mut swap = Swap::new(
            1,
            account("alice.near"),
            account("bob.near"),
            vec![AssetRef::unique(nft.clone(), "1")],
            NearToken::from_near(1),
            NearToken::from_yoctonear(100),
        );
        swap.counterparty_assets = vec![AssetRef::unique(nft, "2")];
        swap.counterparty_value = NearToken::from_near(2);
        swap.state = SwapState::Funded;

        let deliveries = swap.settlement_deliveries();
        assert_eq!(deliveries.len(), 4);
        assert!(deliveries[..2].iter().all(|d| d.receiver_id == swap.proposer_id));
        assert!(deliveries[2..].iter().all(|d| d.receiver_id == swap.counterparty_id));

        let refund = swap.refund_deliveries();
        assert_eq!(refund.len(), 2);
        assert!(refund.iter().all(|d| d.receiver_id == swap.proposer_id));
    }
}
