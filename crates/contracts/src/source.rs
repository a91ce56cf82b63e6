//! MessageSource trait - log consumer interface
//!
//! Defines the abstract interface for whatever reads records off the log.

use crate::{CallMessage, ContractError};

/// Message input trait
///
/// Implemented by log consumers that turn records into `CallMessage`s.
#[trait_variant::make(MessageSource: Send)]
pub trait LocalMessageSource {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Read the next message
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    /// Returns a read error (should include context)
    async fn poll(&mut self) -> Result<Option<CallMessage>, ContractError>;

    /// Commit everything returned by `poll` so far
    async fn commit(&mut self) -> Result<(), ContractError>;
}
