//! Transport collaborator trait for the repository core.
//!
//! The trait is defined here separately from any implementation so the core
//! (fetch pipeline, insert/delete handles) depends only on the operations it
//! needs from the network layer:
//!
//! - retrieval of a named content object, resolving to the object or a
//!   transport-level timeout
//! - delivery of an encoded command response to the command issuer
//!
//! Command arrival is not part of the trait: the transport pushes received
//! command bytes into [`crate::repo::Repo::deliver_command`].

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::messages::ContentObject;
use crate::name::Name;

/// Why a retrieval did not produce content. `Timeout` is the only retryable
/// case; the others terminate the owning insert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no matching content arrived within the wait bound")]
    Timeout,
    #[error("response name does not match the requested name")]
    NameMismatch,
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Network face the repository pulls content through and answers commands on.
#[async_trait]
pub trait Face: Send + Sync + 'static {
    /// Issue one retrieval request for `name` and resolve with the matching
    /// content object, or `FetchError::Timeout` when the transport's own wait
    /// bound elapses without a response.
    async fn express_retrieval(&self, name: &Name) -> Result<ContentObject, FetchError>;

    /// Deliver an encoded [`crate::messages::CommandResponse`] to the issuer
    /// of the command currently being answered.
    async fn send_response(&self, response: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl<F: Face> Face for std::sync::Arc<F> {
    async fn express_retrieval(&self, name: &Name) -> Result<ContentObject, FetchError> {
        (**self).express_retrieval(name).await
    }

    async fn send_response(&self, response: Vec<u8>) -> Result<()> {
        (**self).send_response(response).await
    }
}
