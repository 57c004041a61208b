use std::collections::HashSet;

use near_sdk::json_types::U128;
use near_sdk::{near, AccountId, NearToken};

use crate::errors::SwapError;

/// Upper bound on assets per side, keeps a full settlement inside one
/// transaction's gas.
pub const MAX_ASSETS_PER_SIDE: usize = 8;

// Token id as issued by the asset contract.
pub type TokenId = String;

/// How much of a token a reference moves.
#[near(serializers = [json, borsh])]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetAmount {
    /// A uniquely owned token on an NFT contract.
    Unique,
    /// A quantity of a multi-token. Must be non-zero.
    Fungible(U128),
}

/// One entry of a swap bundle.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRef {
    pub contract_id: AccountId,
    pub token_id: TokenId,
    pub amount: AssetAmount,
}

impl AssetRef {
    pub fn unique(contract_id: AccountId, token_id: impl Into<TokenId>) -> Self {
        Self {
            contract_id,
            token_id: token_id.into(),
            amount: AssetAmount::Unique,
        }
    }

    pub fn fungible(contract_id: AccountId, token_id: impl Into<TokenId>, quantity: u128) -> Self {
        Self {
            contract_id,
            token_id: token_id.into(),
            amount: AssetAmount::Fungible(U128(quantity)),
        }
    }

    /// Units this reference moves: 1 for a unique token.
    pub fn quantity(&self) -> u128 {
        match self.amount {
            AssetAmount::Unique => 1,
            AssetAmount::Fungible(amount) => amount.0,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.amount == AssetAmount::Unique
    }
}

/// Something the contract holds on behalf of a user.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq)]
pub enum Holding {
    Asset(AssetRef),
    Native(NearToken),
}

/// An outbound movement from custody to `receiver_id`.
#[near(serializers = [json, borsh])]
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub receiver_id: AccountId,
    pub holding: Holding,
}

impl Delivery {
    /// Deliveries that hand a whole bundle to `receiver_id`. A zero value
    /// produces no native delivery.
    pub fn bundle(receiver_id: &AccountId, assets: &[AssetRef], value: NearToken) -> Vec<Delivery> {
        let mut deliveries: Vec<Delivery> = assets
            .iter()
            .map(|asset| Delivery {
                receiver_id: receiver_id.clone(),
                holding: Holding::Asset(asset.clone()),
            })
            .collect();
        if value.as_yoctonear() > 0 {
            deliveries.push(Delivery {
                receiver_id: receiver_id.clone(),
                holding: Holding::Native(value),
            });
        }
        deliveries
    }
}

/// Checks the shape of a bundle on its own. Custody-dependent checks live
/// with the custodian.
pub fn validate_bundle(assets: &[AssetRef]) -> Result<(), SwapError> {
    if assets.len() > MAX_ASSETS_PER_SIDE {
        return Err(SwapError::InvalidAssets);
    }

    let mut seen = HashSet::new();
    for asset in assets {
        if asset.amount == AssetAmount::Fungible(U128(0)) {
            return Err(SwapError::InvalidAssets);
        }
        if !seen.insert((&asset.contract_id, &asset.token_id)) {
            return Err(SwapError::InvalidAssets);
        }
    }
    Ok(())
}
