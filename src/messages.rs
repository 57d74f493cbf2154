//! # Wire Protocol Messages
//!
//! This module defines all serializable types crossing the command surface
//! and the retrieval surface, plus the codec for them. Messages are
//! serialized with bincode under an explicit size limit so a hostile peer
//! cannot force large allocations through the decoder.
//!
//! ## Command surface
//!
//! | Element | Type |
//! |---------|------|
//! | Command name | `<repoPrefix>/command/<verb>/<ParameterBlock>/<signatureComponents>` |
//! | ParameterBlock | [`CommandParameter`] |
//! | Signed envelope | [`CommandEnvelope`] |
//! | Response payload | [`CommandResponse`] |
//!
//! Decoding is pure: the codec performs no I/O and has no failure mode other
//! than [`DecodeError::Malformed`].

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::name::Name;

/// Maximum size of a single stored payload (1 MiB).
/// Larger content must be inserted as a segmented range.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Maximum buffer size for deserialization.
/// Slightly larger than MAX_PAYLOAD_SIZE to allow for framing overhead.
pub const MAX_DESERIALIZE_SIZE: u64 = (MAX_PAYLOAD_SIZE as u64) + 4096;

/// Command accepted, processing continues asynchronously (insert ack).
pub const STATUS_PROCESSING: u16 = 100;
/// Command accepted and completed (delete ack, synchronous successes).
pub const STATUS_OK: u16 = 200;
/// Command rejected by the trust policy (only sent under `RejectionPolicy::Respond`).
pub const STATUS_UNAUTHORIZED: u16 = 401;
/// Command parameter block failed to decode (only sent under `RejectionPolicy::Respond`).
pub const STATUS_MALFORMED: u16 = 403;
/// Reserved: no record under the requested name.
pub const STATUS_NOT_FOUND: u16 = 404;
/// Reserved: storage engine failure.
pub const STATUS_STORAGE_FAILURE: u16 = 500;

/// Returns bincode options with size limits enforced.
/// Always use this for deserialization of wire-facing bytes.
fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_DESERIALIZE_SIZE)
        .with_fixint_encoding()
}

/// Deserialize with size bounds enforced.
pub fn deserialize_bounded<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    bincode_options().deserialize_from(bytes).map_err(|_| DecodeError::Malformed)
}

fn serialize<T: Serialize>(value: &T) -> Vec<u8> {
    // Only the size-bounded encode can fail here; an empty buffer is
    // rejected as malformed by any bounded decoder on the far side.
    bincode_options().serialize(value).unwrap_or_default()
}

/// Decoding failure for any wire-facing block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed block")]
    Malformed,
}

/// The operation a command requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandVerb {
    Insert,
    Delete,
}

impl CommandVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandVerb::Insert => "insert",
            CommandVerb::Delete => "delete",
        }
    }
}

/// Decoded parameter block: what content to act on, and the correlation id
/// tying a command to its eventual outcome. Immutable once decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub target_name: Name,
    pub process_id: u64,
    /// Inclusive segment range `(start, end)` for segmented inserts.
    pub segment_range: Option<(u64, u64)>,
}

impl CommandParameter {
    pub fn new(target_name: Name, process_id: u64) -> Self {
        Self {
            target_name,
            process_id,
            segment_range: None,
        }
    }

    pub fn with_segments(target_name: Name, process_id: u64, start: u64, end: u64) -> Self {
        Self {
            target_name,
            process_id,
            segment_range: Some((start, end)),
        }
    }
}

/// Status reported back to a command issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status_code: u16,
    pub process_id: u64,
    pub inserted_count: u64,
}

impl CommandResponse {
    pub fn new(status_code: u16, process_id: u64) -> Self {
        Self {
            status_code,
            process_id,
            inserted_count: 0,
        }
    }
}

/// An immutable named payload plus signature: the unit of storage and
/// retrieval. Signature verification happens before persistence; the storage
/// contract does not retain it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentObject {
    pub name: Name,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl ContentObject {
    pub fn new(name: Name, payload: Vec<u8>) -> Self {
        Self {
            name,
            payload,
            signature: Vec::new(),
        }
    }
}

/// A signed command as delivered by the transport: the command name parts
/// (repo prefix, verb, encoded parameter block) plus the signature components
/// binding them to a signer at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub prefix: Name,
    pub verb: CommandVerb,
    /// Encoded [`CommandParameter`] block.
    pub parameter: Vec<u8>,
    /// Milliseconds since Unix epoch; bounds command freshness.
    pub timestamp_ms: u64,
    /// Uniquifies commands issued within the same millisecond.
    pub nonce: u64,
    /// Ed25519 public key of the signer.
    pub signer: [u8; 32],
    pub signature: Vec<u8>,
}

impl CommandEnvelope {
    /// The byte string the signature covers: everything except the signature
    /// itself, in wire encoding.
    pub fn signed_payload(&self) -> Vec<u8> {
        serialize(&(
            &self.prefix,
            &self.verb,
            &self.parameter,
            self.timestamp_ms,
            self.nonce,
            &self.signer,
        ))
    }
}

pub fn encode_parameter(parameter: &CommandParameter) -> Vec<u8> {
    serialize(parameter)
}

pub fn decode_parameter(bytes: &[u8]) -> Result<CommandParameter, DecodeError> {
    deserialize_bounded(bytes)
}

pub fn encode_response(response: &CommandResponse) -> Vec<u8> {
    serialize(response)
}

pub fn decode_response(bytes: &[u8]) -> Result<CommandResponse, DecodeError> {
    deserialize_bounded(bytes)
}

pub fn encode_envelope(envelope: &CommandEnvelope) -> Vec<u8> {
    serialize(envelope)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<CommandEnvelope, DecodeError> {
    deserialize_bounded(bytes)
}
