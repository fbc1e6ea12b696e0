//! Explicit session state for the acting ledger account.

use super::record::Address;

/// The ledger account on whose behalf a service acts.
///
/// Passed into service constructors; nothing reads ambient wallet state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub account: Address,
}

impl SessionContext {
    #[must_use]
    pub fn new(account: Address) -> Self {
        Self { account }
    }
}
