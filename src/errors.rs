/// Reasons a swap operation is rejected.
///
/// Returned from `#[handle_result]` methods; near-sdk panics with the
/// variant name, so the whole receipt is reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// Wrong caller for an owner- or party-restricted operation.
    Unauthorized,
    /// No active record for the swap id.
    NotFound,
    /// The record's state forbids the operation.
    InvalidState,
    /// An asset contract rejected a pull or a push.
    AssetTransferFailed,
    /// Malformed bundle: repeated assets, zero quantities, too many entries,
    /// or a unique asset that is already in custody.
    InvalidAssets,
    /// Attached deposit does not cover the swap fee.
    InsufficientDeposit,
}

impl AsRef<str> for SwapError {
    fn as_ref(&self) -> &str {
        match self {
            SwapError::Unauthorized => "Unauthorized",
            SwapError::NotFound => "NotFound",
            SwapError::InvalidState => "InvalidState",
            SwapError::AssetTransferFailed => "AssetTransferFailed",
            SwapError::InvalidAssets => "InvalidAssets",
            SwapError::InsufficientDeposit => "InsufficientDeposit",
        }
    }
}

impl std::fmt::Display for SwapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}
