use near_sdk::json_types::U128;
use near_sdk::store::{LookupMap, LookupSet};
use near_sdk::{assert_one_yocto, env, log, near, require, AccountId, PanicOnDefault};

pub type TokenId = String;

// Unique tokens and multi-token balances in one contract. Owners grant an
// operator blanket access with `approve`.
#[near(contract_state)]
#[derive(PanicOnDefault)]
pub struct Contract {
    owners: LookupMap<TokenId, AccountId>,
    balances: LookupMap<(TokenId, AccountId), u128>,
    operators: LookupSet<(AccountId, AccountId)>,
    frozen: bool,
}

#[near]
impl Contract {
    #[init]
    pub fn new() -> Self {
        Self {
            owners: LookupMap::new(b"o"),
            balances: LookupMap::new(b"b"),
            operators: LookupSet::new(b"p"),
            frozen: false,
        }
    }

    pub fn nft_mint(&mut self, token_id: TokenId, owner_id: AccountId) {
        require!(!self.owners.contains_key(&token_id), "Token already minted");
        self.owners.insert(token_id, owner_id);
    }

    pub fn mt_mint(&mut self, token_id: TokenId, owner_id: AccountId, amount: U128) {
        let balance = self.mt_balance_of(owner_id.clone(), token_id.clone()).0;
        self.balances.insert((token_id, owner_id), balance + amount.0);
    }

    pub fn approve(&mut self, operator_id: AccountId) {
        self.operators
            .insert((env::predecessor_account_id(), operator_id));
    }

    /// Makes every transfer fail, to exercise rollback paths.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    #[payable]
    pub fn nft_transfer(
        &mut self,
        receiver_id: AccountId,
        token_id: TokenId,
        approval_id: Option<u64>,
        memo: Option<String>,
    ) {
        let _ = approval_id;
        assert_one_yocto();
        let owner_id = env::predecessor_account_id();
        self.move_unique(&owner_id, receiver_id, token_id, memo);
    }

    #[payable]
    pub fn nft_transfer_from(
        &mut self,
        owner_id: AccountId,
        receiver_id: AccountId,
        token_id: TokenId,
        memo: Option<String>,
    ) {
        assert_one_yocto();
        self.assert_operator(&owner_id);
        self.move_unique(&owner_id, receiver_id, token_id, memo);
    }

    #[payable]
    pub fn mt_transfer(
        &mut self,
        receiver_id: AccountId,
        token_id: TokenId,
        amount: U128,
        approval: Option<(AccountId, u64)>,
        memo: Option<String>,
    ) {
        let _ = approval;
        assert_one_yocto();
        let owner_id = env::predecessor_account_id();
        self.move_quantity(&owner_id, receiver_id, token_id, amount.0, memo);
    }

    #[payable]
    pub fn mt_transfer_from(
        &mut self,
        owner_id: AccountId,
        receiver_id: AccountId,
        token_id: TokenId,
        amount: U128,
        memo: Option<String>,
    ) {
        assert_one_yocto();
        self.assert_operator(&owner_id);
        self.move_quantity(&owner_id, receiver_id, token_id, amount.0, memo);
    }

    pub fn nft_owner(&self, token_id: TokenId) -> Option<AccountId> {
        self.owners.get(&token_id).cloned()
    }

    pub fn mt_balance_of(&self, account_id: AccountId, token_id: TokenId) -> U128 {
        U128(self.balances.get(&(token_id, account_id)).copied().unwrap_or(0))
    }
}

impl Contract {
    fn assert_operator(&self, owner_id: &AccountId) {
        require!(
            self.operators
                .contains(&(owner_id.clone(), env::predecessor_account_id())),
            "Operator not approved"
        );
    }

    fn move_unique(
        &mut self,
        owner_id: &AccountId,
        receiver_id: AccountId,
        token_id: TokenId,
        memo: Option<String>,
    ) {
        require!(!self.frozen, "Transfers are frozen");
        require!(
            self.owners.get(&token_id) == Some(owner_id),
            "Sender does not own the token"
        );
        log!("nft {} -> {} ({:?})", token_id, receiver_id, memo);
        self.owners.insert(token_id, receiver_id);
    }

    fn move_quantity(
        &mut self,
        owner_id: &AccountId,
        receiver_id: AccountId,
        token_id: TokenId,
        amount: u128,
        memo: Option<String>,
    ) {
        require!(!self.frozen, "Transfers are frozen");
        let balance = self.mt_balance_of(owner_id.clone(), token_id.clone()).0;
        require!(balance >= amount, "Insufficient balance");
        log!("mt {} x{} -> {} ({:?})", token_id, amount, receiver_id, memo);

        self.balances
            .insert((token_id.clone(), owner_id.clone()), balance - amount);
        let received = self.mt_balance_of(receiver_id.clone(), token_id.clone()).0;
        self.balances.insert((token_id, receiver_id), received + amount);
    }
}
