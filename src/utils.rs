use near_sdk::{env, AccountId, NearToken, Promise, PromiseError};

use crate::swap::SwapId;

// Helper for consistent logging
pub fn log_swap_event(event: &str, swap_id: SwapId, actor: &AccountId, value: NearToken) {
    env::log_str(&format!(
        "SWAP_{}: id='{}', actor='{}', value='{}'",
        event,
        swap_id,
        actor,
        value.as_yoctonear()
    ));
}

/// Joins promises so a single callback sees every result, in order.
pub fn join_promises(promises: impl IntoIterator<Item = Promise>) -> Option<Promise> {
    promises.into_iter().reduce(|joined, next| joined.and(next))
}

/// Success flag of each promise joined into the current callback.
///
/// Only success matters here, so no result bytes are read; a result longer
/// than the zero-byte limit still counts as a success.
pub fn promise_outcomes() -> Vec<bool> {
    (0..env::promise_results_count())
        .map(|index| {
            matches!(
                env::promise_result_checked(index, 0),
                Ok(_) | Err(PromiseError::TooLong(_))
            )
        })
        .collect()
}
