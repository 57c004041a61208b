use near_sdk::json_types::U128;
use near_sdk::store::IterableMap;
use near_sdk::{
    env, ext_contract, log, near, AccountId, Gas, NearToken, Promise, PromiseOrValue,
};

mod asset;
mod custody;
mod errors;
mod fees;
mod swap;
mod utils;

pub use asset::{AssetAmount, AssetRef, Delivery, Holding, TokenId, MAX_ASSETS_PER_SIDE};
pub use errors::SwapError;
pub use swap::{Swap, SwapId, SwapState, ZERO_ACCOUNT_ID};

use asset::validate_bundle;
use custody::{Custody, GAS_FOR_ASSET_TRANSFER};
use fees::FeeController;
use swap::IdAllocator;
use utils::{log_swap_event, promise_outcomes};

const GAS_FOR_RESOLVE_PULL: Gas = Gas::from_tgas(20);
const GAS_FOR_RESOLVE_DELIVERY: Gas = Gas::from_tgas(10);
const GAS_PER_RESOLVED_ITEM: Gas = Gas::from_tgas(1);
const GAS_FOR_ABORT: Gas = Gas::from_tgas(5);
const GAS_FOR_FEE_CALLBACK: Gas = Gas::from_tgas(10);

// External contract interfaces
#[ext_contract(ext_asset)]
pub trait TransferableAsset {
    // Pulls. Not part of NEP-171 / NEP-245: an operator extension the asset
    // contract must expose, callable once `owner_id` has approved this contract.
    fn nft_transfer_from(
        &mut self,
        owner_id: AccountId,
        receiver_id: AccountId,
        token_id: TokenId,
        memo: Option<String>,
    );
    fn mt_transfer_from(
        &mut self,
        owner_id: AccountId,
        receiver_id: AccountId,
        token_id: TokenId,
        amount: U128,
        memo: Option<String>,
    );

    // Pushes out of the contract's own holdings, standard NEP-171 / NEP-245 calls
    fn nft_transfer(
        &mut self,
        receiver_id: AccountId,
        token_id: TokenId,
        approval_id: Option<u64>,
        memo: Option<String>,
    );
    fn mt_transfer(
        &mut self,
        receiver_id: AccountId,
        token_id: TokenId,
        amount: U128,
        approval: Option<(AccountId, u64)>,
        memo: Option<String>,
    );
}

#[ext_contract(ext_self)]
pub trait SelfCallbacks {
    fn on_proposer_assets_pulled(&mut self, swap: Swap);
    fn on_counterparty_assets_pulled(
        &mut self,
        swap_id: SwapId,
        counterparty_id: AccountId,
        assets: Vec<AssetRef>,
        value: NearToken,
    );
    fn on_deliveries_resolved(&mut self, swap_id: SwapId, deliveries: Vec<Delivery>);
    fn on_transfer_aborted(&self, swap_id: SwapId);
    fn on_fees_withdrawn(&mut self, amount: NearToken);
}

/// Callback gas after a pull: enough to send every asset and the deposit back.
fn pull_callback_gas(assets: usize) -> Gas {
    let returns = assets as u64 + 1;
    GAS_FOR_RESOLVE_PULL
        .saturating_add(GAS_FOR_ASSET_TRANSFER.saturating_mul(returns))
        .saturating_add(delivery_callback_gas(returns as usize))
        .saturating_add(GAS_FOR_ABORT)
}

fn delivery_callback_gas(deliveries: usize) -> Gas {
    GAS_FOR_RESOLVE_DELIVERY
        .saturating_add(GAS_PER_RESOLVED_ITEM.saturating_mul(deliveries as u64))
        .saturating_add(GAS_FOR_ABORT)
}

fn all_succeeded(outcomes: &[bool], expected: usize) -> bool {
    outcomes.len() == expected && outcomes.iter().all(|ok| *ok)
}

// Define the contract structure
#[near(contract_state)]
pub struct Contract {
    pub owner_id: AccountId,
    pub fees: FeeController,
    pub ids: IdAllocator,
    // Active swaps only; closing a swap removes its record.
    pub swaps: IterableMap<SwapId, Swap>,
    pub custody: Custody,
    // Deliveries that bounced, parked per swap until someone retries them.
    pub undelivered: IterableMap<SwapId, Vec<Delivery>>,
}

// Define the default, which automatically initializes the contract
impl Default for Contract {
    fn default() -> Self {
        Self::new(env::predecessor_account_id(), NearToken::from_yoctonear(0))
    }
}

// Implement the contract structure
#[near]
impl Contract {
    #[init]
    pub fn new(owner_id: AccountId, fee: NearToken) -> Self {
        Self {
            owner_id,
            fees: FeeController::new(fee),
            ids: IdAllocator::default(),
            swaps: IterableMap::new(b"s"),
            custody: Custody::new(),
            undelivered: IterableMap::new(b"u"),
        }
    }

    pub fn get_fee(&self) -> NearToken {
        self.fees.fee()
    }

    #[handle_result]
    pub fn change_fee(&mut self, new_fee: NearToken) -> Result<(), SwapError> {
        self.assert_owner()?;
        self.fees.set_fee(new_fee);
        log!("FEE_CHANGED: fee='{}'", new_fee.as_yoctonear());
        Ok(())
    }

    /// Transfers the collected fee revenue to the owner.
    #[handle_result]
    pub fn withdraw_fees(&mut self) -> Result<PromiseOrValue<NearToken>, SwapError> {
        self.assert_owner()?;
        let amount = self.fees.take_collected();
        if amount.as_yoctonear() == 0 {
            return Ok(PromiseOrValue::Value(amount));
        }

        log!("FEES_WITHDRAWN: amount='{}'", amount.as_yoctonear());
        Ok(PromiseOrValue::Promise(
            Promise::new(self.owner_id.clone()).transfer(amount).then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(GAS_FOR_FEE_CALLBACK)
                    .on_fees_withdrawn(amount),
            ),
        ))
    }

    /// Proposes a swap to `counterparty_id`, depositing `assets` and the
    /// attached NEAR minus the fee. Resolves to the new swap id.
    ///
    /// Every asset contract must have approved this contract beforehand.
    /// The record only appears once every pull has succeeded.
    #[payable]
    #[handle_result]
    pub fn create_swap(
        &mut self,
        counterparty_id: AccountId,
        assets: Vec<AssetRef>,
    ) -> Result<PromiseOrValue<SwapId>, SwapError> {
        let proposer_id = env::predecessor_account_id();
        let (fee, value) = self.fees.split_deposit(env::attached_deposit())?;
        self.check_bundle(&assets)?;

        let swap = Swap::new(
            self.ids.next_id(),
            proposer_id.clone(),
            counterparty_id,
            assets,
            value,
            fee,
        );

        match self.custody.pull_in(&proposer_id, &swap.proposer_assets) {
            None => Ok(PromiseOrValue::Value(self.commit_proposal(swap))),
            Some(pulls) => {
                let gas = pull_callback_gas(swap.proposer_assets.len());
                Ok(PromiseOrValue::Promise(pulls.then(
                    ext_self::ext(env::current_account_id())
                        .with_static_gas(gas)
                        .on_proposer_assets_pulled(swap),
                )))
            }
        }
    }

    /// The active record, or the zero-valued default when the swap is
    /// closed or never existed.
    pub fn get_swap(&self, swap_id: SwapId) -> Swap {
        self.swaps.get(&swap_id).cloned().unwrap_or_default()
    }

    /// Counterparty side: deposits `assets` and the attached NEAR.
    #[payable]
    #[handle_result]
    pub fn init_swap(
        &mut self,
        swap_id: SwapId,
        assets: Vec<AssetRef>,
    ) -> Result<PromiseOrValue<SwapId>, SwapError> {
        let counterparty_id = env::predecessor_account_id();
        let value = env::attached_deposit();

        let swap = self.swaps.get(&swap_id).ok_or(SwapError::NotFound)?;
        if swap.counterparty_id != counterparty_id {
            return Err(SwapError::Unauthorized);
        }
        if swap.state != SwapState::Created {
            return Err(SwapError::InvalidState);
        }
        self.check_bundle(&assets)?;

        // Lock the record before any asset moves.
        self.set_state(swap_id, SwapState::Funding);

        match self.custody.pull_in(&counterparty_id, &assets) {
            None => Ok(PromiseOrValue::Value(
                self.commit_funding(swap_id, assets, value),
            )),
            Some(pulls) => {
                let gas = pull_callback_gas(assets.len());
                Ok(PromiseOrValue::Promise(pulls.then(
                    ext_self::ext(env::current_account_id())
                        .with_static_gas(gas)
                        .on_counterparty_assets_pulled(swap_id, counterparty_id, assets, value),
                )))
            }
        }
    }

    /// Settles a funded swap: each side receives the other's bundle.
    /// Anyone may trigger it.
    #[handle_result]
    pub fn finish_swap(&mut self, swap_id: SwapId) -> Result<PromiseOrValue<bool>, SwapError> {
        let swap = self.swaps.get(&swap_id).ok_or(SwapError::NotFound)?;
        if swap.state != SwapState::Funded {
            return Err(SwapError::InvalidState);
        }

        let swap = self.swaps.remove(&swap_id).ok_or(SwapError::NotFound)?;
        log_swap_event(
            "FINISHED",
            swap_id,
            &env::predecessor_account_id(),
            swap.proposer_value.saturating_add(swap.counterparty_value),
        );
        Ok(self.settle(swap_id, swap.settlement_deliveries()))
    }

    /// Proposer takes back an unfunded swap.
    #[handle_result]
    pub fn cancel_swap(&mut self, swap_id: SwapId) -> Result<PromiseOrValue<bool>, SwapError> {
        let swap = self.swaps.get(&swap_id).ok_or(SwapError::NotFound)?;
        if swap.proposer_id != env::predecessor_account_id() {
            return Err(SwapError::Unauthorized);
        }
        if swap.state != SwapState::Created {
            return Err(SwapError::InvalidState);
        }

        let swap = self.swaps.remove(&swap_id).ok_or(SwapError::NotFound)?;
        log_swap_event("CANCELED", swap_id, &swap.proposer_id, swap.proposer_value);
        Ok(self.settle(swap_id, swap.refund_deliveries()))
    }

    /// Sends parked deliveries of `swap_id` again. Receivers are fixed, so
    /// anyone may call it.
    #[handle_result]
    pub fn retry_delivery(&mut self, swap_id: SwapId) -> Result<PromiseOrValue<bool>, SwapError> {
        let parked = self.undelivered.remove(&swap_id).ok_or(SwapError::NotFound)?;
        log_swap_event(
            "REDELIVERY",
            swap_id,
            &env::predecessor_account_id(),
            NearToken::from_yoctonear(0),
        );
        Ok(self.settle(swap_id, parked))
    }

    // --- VIEWS ---

    pub fn get_owner(&self) -> AccountId {
        self.owner_id.clone()
    }

    pub fn get_last_swap_id(&self) -> SwapId {
        self.ids.last_id()
    }

    pub fn get_swaps(&self, from_index: Option<u32>, limit: Option<u32>) -> Vec<Swap> {
        self.swaps
            .values()
            .skip(from_index.unwrap_or(0) as usize)
            .take(limit.unwrap_or(50) as usize)
            .cloned()
            .collect()
    }

    pub fn get_undelivered(&self, swap_id: SwapId) -> Vec<Delivery> {
        self.undelivered.get(&swap_id).cloned().unwrap_or_default()
    }

    pub fn get_collected_fees(&self) -> NearToken {
        self.fees.collected()
    }

    pub fn get_custody_balance(&self, contract_id: AccountId, token_id: TokenId) -> U128 {
        self.custody.balance_of(&contract_id, &token_id)
    }

    pub fn get_escrowed_value(&self) -> NearToken {
        self.custody.value()
    }

    // --- PRIVATE CALLBACKS ---

    #[private]
    pub fn on_proposer_assets_pulled(&mut self, swap: Swap) -> PromiseOrValue<SwapId> {
        self.resolve_proposer_pull(swap, &promise_outcomes())
    }

    #[private]
    pub fn on_counterparty_assets_pulled(
        &mut self,
        swap_id: SwapId,
        counterparty_id: AccountId,
        assets: Vec<AssetRef>,
        value: NearToken,
    ) -> PromiseOrValue<SwapId> {
        self.resolve_counterparty_pull(swap_id, counterparty_id, assets, value, &promise_outcomes())
    }

    #[private]
    pub fn on_deliveries_resolved(
        &mut self,
        swap_id: SwapId,
        deliveries: Vec<Delivery>,
    ) -> PromiseOrValue<bool> {
        self.resolve_deliveries(swap_id, deliveries, &promise_outcomes())
    }

    /// Last link of a chain that had to be rolled back; fails it so the
    /// caller sees the error.
    #[private]
    pub fn on_transfer_aborted(&self, swap_id: SwapId) {
        log!("SWAP_ABORTED: id='{}'", swap_id);
        env::panic_str(SwapError::AssetTransferFailed.as_ref())
    }

    #[private]
    pub fn on_fees_withdrawn(&mut self, amount: NearToken) -> NearToken {
        let delivered = promise_outcomes().first().copied().unwrap_or(false);
        self.resolve_fee_withdrawal(amount, delivered)
    }
}

impl Contract {
    fn assert_owner(&self) -> Result<(), SwapError> {
        if env::predecessor_account_id() != self.owner_id {
            return Err(SwapError::Unauthorized);
        }
        Ok(())
    }

    fn check_bundle(&self, assets: &[AssetRef]) -> Result<(), SwapError> {
        validate_bundle(assets)?;
        self.custody.assert_not_held(assets)
    }

    fn set_state(&mut self, swap_id: SwapId, state: SwapState) {
        if let Some(swap) = self.swaps.get_mut(&swap_id) {
            swap.state = state;
        }
    }

    fn commit_proposal(&mut self, swap: Swap) -> SwapId {
        let swap_id = swap.id;
        self.custody
            .credit_bundle(&swap.proposer_assets, swap.proposer_value);
        self.fees.collect(swap.fee);
        log_swap_event("CREATED", swap_id, &swap.proposer_id, swap.proposer_value);
        self.swaps.insert(swap_id, swap);
        swap_id
    }

    fn commit_funding(&mut self, swap_id: SwapId, assets: Vec<AssetRef>, value: NearToken) -> SwapId {
        self.custody.credit_bundle(&assets, value);
        if let Some(swap) = self.swaps.get_mut(&swap_id) {
            swap.counterparty_assets = assets;
            swap.counterparty_value = value;
            swap.state = SwapState::Funded;
            log_swap_event("FUNDED", swap_id, &swap.counterparty_id, value);
        }
        swap_id
    }

    fn resolve_proposer_pull(&mut self, swap: Swap, outcomes: &[bool]) -> PromiseOrValue<SwapId> {
        if all_succeeded(outcomes, swap.proposer_assets.len()) {
            return PromiseOrValue::Value(self.commit_proposal(swap));
        }

        // The fee is only earned by a committed swap.
        let refund = swap.proposer_value.saturating_add(swap.fee);
        self.abort_pull(swap.id, &swap.proposer_id, &swap.proposer_assets, outcomes, refund)
    }

    fn resolve_counterparty_pull(
        &mut self,
        swap_id: SwapId,
        counterparty_id: AccountId,
        assets: Vec<AssetRef>,
        value: NearToken,
        outcomes: &[bool],
    ) -> PromiseOrValue<SwapId> {
        let locked = self
            .swaps
            .get(&swap_id)
            .is_some_and(|swap| swap.state == SwapState::Funding);
        if locked && all_succeeded(outcomes, assets.len()) {
            return PromiseOrValue::Value(self.commit_funding(swap_id, assets, value));
        }

        if locked {
            self.set_state(swap_id, SwapState::Created);
        }
        self.abort_pull(swap_id, &counterparty_id, &assets, outcomes, value)
    }

    /// Returns whatever did arrive, plus the deposit, to `owner_id` and
    /// ends the chain with `AssetTransferFailed`.
    ///
    /// Never panics itself: the failure is reported by a later receipt, so
    /// the state written here (an unlocked record) is kept.
    fn abort_pull(
        &mut self,
        swap_id: SwapId,
        owner_id: &AccountId,
        assets: &[AssetRef],
        outcomes: &[bool],
        refund: NearToken,
    ) -> PromiseOrValue<SwapId> {
        let pulled: Vec<AssetRef> = assets
            .iter()
            .zip(outcomes)
            .filter(|(_, ok)| **ok)
            .map(|(asset, _)| asset.clone())
            .collect();
        log_swap_event("PULL_FAILED", swap_id, owner_id, refund);

        // Held until the return deliveries debit it again.
        self.custody.credit_bundle(&pulled, refund);
        let returns = Delivery::bundle(owner_id, &pulled, refund);

        let aborted = match self.deliver(swap_id, returns) {
            Some(delivery) => delivery.then(Self::abort_chain(swap_id)),
            None => Self::abort_chain(swap_id),
        };
        PromiseOrValue::Promise(aborted)
    }

    fn abort_chain(swap_id: SwapId) -> Promise {
        ext_self::ext(env::current_account_id())
            .with_static_gas(GAS_FOR_ABORT)
            .on_transfer_aborted(swap_id)
    }

    fn deliver(&mut self, swap_id: SwapId, deliveries: Vec<Delivery>) -> Option<Promise> {
        let transfers = self.custody.push_out(&deliveries)?;
        let gas = delivery_callback_gas(deliveries.len());
        Some(
            transfers.then(
                ext_self::ext(env::current_account_id())
                    .with_static_gas(gas)
                    .on_deliveries_resolved(swap_id, deliveries),
            ),
        )
    }

    fn settle(&mut self, swap_id: SwapId, deliveries: Vec<Delivery>) -> PromiseOrValue<bool> {
        self.deliver(swap_id, deliveries)
            .map_or(PromiseOrValue::Value(true), PromiseOrValue::Promise)
    }

    fn resolve_deliveries(
        &mut self,
        swap_id: SwapId,
        deliveries: Vec<Delivery>,
        outcomes: &[bool],
    ) -> PromiseOrValue<bool> {
        let failed: Vec<Delivery> = deliveries
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !outcomes.get(*index).copied().unwrap_or(false))
            .map(|(_, delivery)| delivery)
            .collect();

        if failed.is_empty() {
            log!("SWAP_DELIVERED: id='{}'", swap_id);
            return PromiseOrValue::Value(true);
        }

        for delivery in &failed {
            self.custody.credit(&delivery.holding);
            let value = match delivery.holding {
                Holding::Native(amount) => amount,
                Holding::Asset(_) => NearToken::from_yoctonear(0),
            };
            log_swap_event("DELIVERY_FAILED", swap_id, &delivery.receiver_id, value);
        }
        let mut parked = self.undelivered.remove(&swap_id).unwrap_or_default();
        parked.extend(failed);
        self.undelivered.insert(swap_id, parked);

        PromiseOrValue::Promise(Self::abort_chain(swap_id))
    }

    fn resolve_fee_withdrawal(&mut self, amount: NearToken, delivered: bool) -> NearToken {
        if delivered {
            return amount;
        }
        log!("FEE_WITHDRAWAL_FAILED: restored='{}'", amount.as_yoctonear());
        self.fees.collect(amount);
        NearToken::from_yoctonear(0)
    }
}
