//! # repostore
//!
//! Command-driven content repository core for a named-data network. Clients
//! issue signed insert/delete commands naming content hierarchically; the
//! repository pulls the named content from the network itself (insert) or
//! removes it from durable storage (delete), acking acceptance immediately
//! and completing asynchronously.
//!
//! The core is transport- and storage-agnostic: implement [`Face`] for your
//! network layer and [`Storage`] for your persistence engine, then spawn a
//! [`Repo`] over them.
//!
//! ```ignore
//! let keypair = Keypair::generate();
//! let policy = TrustPolicy::default().authorize(keypair.public_key_bytes());
//! let repo = Repo::spawn(face, MemoryStore::new(),
//!                        CommandValidator::new(policy), RepoConfig::default());
//!
//! // Transport delivers signed command bytes:
//! repo.deliver_command(command_bytes).await?;
//! ```

pub mod face;
pub mod fetch;
pub mod messages;
pub mod name;
pub mod repo;
pub mod scheduler;
pub mod storage;
pub mod validator;

pub use face::{Face, FetchError};
pub use messages::{
    CommandParameter, CommandResponse, CommandVerb, ContentObject, DecodeError, STATUS_MALFORMED,
    STATUS_OK, STATUS_PROCESSING, STATUS_UNAUTHORIZED,
};
pub use name::Name;
pub use repo::{RejectionPolicy, Repo, RepoConfig};
pub use storage::{MemoryStore, Selector, Storage, StorageError, StorageRecord};
pub use validator::{AuthError, CommandIssuer, CommandValidator, Keypair, TrustPolicy};
