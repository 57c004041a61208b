use near_sdk::json_types::U128;
use near_sdk::store::LookupMap;
use near_sdk::{env, near, AccountId, Gas, NearToken, Promise};

use crate::asset::{AssetAmount, AssetRef, Delivery, Holding, TokenId};
use crate::errors::SwapError;
use crate::ext_asset;
use crate::utils::join_promises;

pub const GAS_FOR_ASSET_TRANSFER: Gas = Gas::from_tgas(10);
const ONE_YOCTO: NearToken = NearToken::from_yoctonear(1);

pub type AssetKey = (AccountId, TokenId);

/// Ledger of everything the contract holds for users, plus the calls that
/// move it in and out.
#[near(serializers = [borsh])]
pub struct Custody {
    // (asset contract, token id) -> units held
    held: LookupMap<AssetKey, u128>,
    value: NearToken,
}

impl Custody {
    pub fn new() -> Self {
        Self {
            held: LookupMap::new(b"c"),
            value: NearToken::from_yoctonear(0),
        }
    }

    pub fn balance_of(&self, contract_id: &AccountId, token_id: &str) -> U128 {
        let key = (contract_id.clone(), token_id.to_string());
        U128(self.held.get(&key).copied().unwrap_or(0))
    }

    pub fn value(&self) -> NearToken {
        self.value
    }

    /// Rejects unique tokens that some record already holds.
    pub fn assert_not_held(&self, assets: &[AssetRef]) -> Result<(), SwapError> {
        let already_held = assets
            .iter()
            .filter(|asset| asset.is_unique())
            .any(|asset| self.balance_of(&asset.contract_id, &asset.token_id).0 > 0);
        if already_held {
            return Err(SwapError::InvalidAssets);
        }
        Ok(())
    }

    pub fn credit(&mut self, holding: &Holding) {
        match holding {
            Holding::Asset(asset) => {
                let key = (asset.contract_id.clone(), asset.token_id.clone());
                let current = self.held.get(&key).copied().unwrap_or(0);
                self.held.insert(key, current.saturating_add(asset.quantity()));
            }
            Holding::Native(amount) => {
                self.value = self.value.saturating_add(*amount);
            }
        }
    }

    pub fn credit_bundle(&mut self, assets: &[AssetRef], value: NearToken) {
        for asset in assets {
            self.credit(&Holding::Asset(asset.clone()));
        }
        self.credit(&Holding::Native(value));
    }

    pub fn debit(&mut self, holding: &Holding) {
        match holding {
            Holding::Asset(asset) => {
                let key = (asset.contract_id.clone(), asset.token_id.clone());
                let current = self.held.get(&key).copied().unwrap_or(0);
                let remaining = current
                    .checked_sub(asset.quantity())
                    .unwrap_or_else(|| env::panic_str("Custody balance underflow"));
                if remaining == 0 {
                    self.held.remove(&key);
                } else {
                    self.held.insert(key, remaining);
                }
            }
            Holding::Native(amount) => {
                self.value = self
                    .value
                    .checked_sub(*amount)
                    .unwrap_or_else(|| env::panic_str("Escrowed value underflow"));
            }
        }
    }

    /// Pulls every asset from `owner_id` into the contract. Returns `None`
    /// for an empty bundle. The ledger is credited only once all pulls
    /// are known to have succeeded.
    pub fn pull_in(&self, owner_id: &AccountId, assets: &[AssetRef]) -> Option<Promise> {
        let receiver_id = env::current_account_id();
        join_promises(assets.iter().map(|asset| {
            let token = ext_asset::ext(asset.contract_id.clone())
                .with_attached_deposit(ONE_YOCTO)
                .with_static_gas(GAS_FOR_ASSET_TRANSFER);
            match asset.amount {
                AssetAmount::Unique => token.nft_transfer_from(
                    owner_id.clone(),
                    receiver_id.clone(),
                    asset.token_id.clone(),
                    Some("NFT swap deposit".to_string()),
                ),
                AssetAmount::Fungible(amount) => token.mt_transfer_from(
                    owner_id.clone(),
                    receiver_id.clone(),
                    asset.token_id.clone(),
                    amount,
                    Some("NFT swap deposit".to_string()),
                ),
            }
        }))
    }

    /// Debits every delivery and issues its transfer. Promise order matches
    /// `deliveries`. Returns `None` when there is nothing to send.
    pub fn push_out(&mut self, deliveries: &[Delivery]) -> Option<Promise> {
        for delivery in deliveries {
            self.debit(&delivery.holding);
        }

        join_promises(deliveries.iter().map(|delivery| {
            let receiver_id = delivery.receiver_id.clone();
            match &delivery.holding {
                Holding::Native(amount) => Promise::new(receiver_id).transfer(*amount),
                Holding::Asset(asset) => {
                    let token = ext_asset::ext(asset.contract_id.clone())
                        .with_attached_deposit(ONE_YOCTO)
                        .with_static_gas(GAS_FOR_ASSET_TRANSFER);
                    match asset.amount {
                        AssetAmount::Unique => token.nft_transfer(
                            receiver_id,
                            asset.token_id.clone(),
                            None,
                            Some("NFT swap release".to_string()),
                        ),
                        AssetAmount::Fungible(amount) => token.mt_transfer(
                            receiver_id,
                            asset.token_id.clone(),
                            amount,
                            None,
                            Some("NFT swap release".to_string()),
                        ),
                    }
                }
            }
        }))
    }
}

impl Default for Custody {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use near_sdk::test_utils::VMContextBuilder;
    use near_sdk::testing_env;

    fn nft(token_id: &str) -> AssetRef {
        AssetRef::unique("nft.test.near".parse().unwrap(), token_id)
    }

    fn gold(quantity: u128) -> AssetRef {
        AssetRef::fungible("mt.test.near".parse().unwrap(), "gold", quantity)
    }

    #[test]
    fn test_credit_and_debit_assets() {
        testing_env!(VMContextBuilder::new().build());
        let mut custody = Custody::new();

        custody.credit_bundle(&[nft("1"), gold(30)], NearToken::from_near(1));
        custody.credit(&Holding::Asset(gold(20)));

        assert_eq!(custody.balance_of(&nft("1").contract_id, "1").0, 1);
        assert_eq!(custody.balance_of(&gold(0).contract_id, "gold").0, 50);
        assert_eq!(custody.value(), NearToken::from_near(1));

        custody.debit(&Holding::Asset(gold(50)));
        custody.debit(&Holding::Native(NearToken::from_near(1)));
        assert_eq!(custody.balance_of(&gold(0).contract_id, "gold").0, 0);
        assert_eq!(custody.value().as_yoctonear(), 0);
    }

    #[test]
    #[should_panic(expected = "Custody balance underflow")]
    fn test_debit_more_than_held_panics() {
        testing_env!(VMContextBuilder::new().build());
        let mut custody = Custody::new();
        custody.credit(&Holding::Asset(gold(5)));
        custody.debit(&Holding::Asset(gold(6)));
    }

    #[test]
    fn test_unique_asset_held_once() {
        testing_env!(VMContextBuilder::new().build());
        let mut custody = Custody::new();
        assert_eq!(custody.assert_not_held(&[nft("9")]), Ok(()));

        custody.credit(&Holding::Asset(nft("9")));
        assert_eq!(custody.assert_not_held(&[nft("9")]), Err(SwapError::InvalidAssets));
        // quantities of a multi-token may sit in several swaps
        custody.credit(&Holding::Asset(gold(1)));
        assert_eq!(custody.assert_not_held(&[gold(1)]), Ok(()));
    }

    #[test]
    fn test_empty_movements_issue_no_calls() {
        testing_env!(VMContextBuilder::new().build());
        let mut custody = Custody::new();
        let owner: AccountId = "alice.near".parse().unwrap();
        assert!(custody.pull_in(&owner, &[]).is_none());
        assert!(custody.push_out(&[]).is_none());
    }

    #[test]
    fn test_push_out_debits_before_sending() {
        testing_env!(VMContextBuilder::new().build());
        let mut custody = Custody::new();
        let receiver: AccountId = "bob.near".parse().unwrap();
        custody.credit_bundle(&[nft("3")], NearToken::from_near(2));

        let deliveries = Delivery::bundle(&receiver, &[nft("3")], NearToken::from_near(2));
        assert!(custody.push_out(&deliveries).is_some());

        assert_eq!(custody.balance_of(&nft("3").contract_id, "3").0, 0);
        assert_eq!(custody.value().as_yoctonear(), 0);
    }
}
