//! # Command Authentication
//!
//! Commands are signed envelopes; this module decides whether an envelope is
//! trustworthy before any state is touched. The check is accept/reject only:
//! no command semantics live here.
//!
//! ## Trust model
//!
//! A signer is its Ed25519 public key. A [`TrustPolicy`] names the set of
//! keys allowed to issue commands and a freshness window bounding how far a
//! command's timestamp may drift from repository time. Signatures are made
//! over a domain-separated encoding of everything in the envelope except the
//! signature itself, so a command for one verb or target can never be
//! replayed as another.
//!
//! [`CommandIssuer`] is the client-side counterpart used by tooling and
//! tests: it signs envelopes and hands out process ids from its own counter,
//! keeping command construction deterministic (no global randomness).

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::debug;

use crate::messages::{encode_parameter, CommandEnvelope, CommandParameter, CommandVerb};
use crate::name::Name;

/// Domain separation prefix for command envelope signatures.
const COMMAND_SIGNATURE_DOMAIN: &[u8] = b"repostore-command-v1:";

/// Default freshness window for command timestamps.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Returns current time as milliseconds since Unix epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Why a command was rejected before any state mutation. Fully recoverable:
/// no side effect has occurred by the time any of these is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("command carries no signature")]
    Unsigned,
    #[error("signer is not an authorized identity")]
    UnknownSigner,
    #[error("command timestamp outside freshness window")]
    StaleTimestamp,
    #[error("signature verification failed")]
    BadSignature,
}

/// Ed25519 signing keypair for command issuers.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_secret_key_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    fn sign_domain(&self, payload: &[u8]) -> Signature {
        let mut message = Vec::with_capacity(COMMAND_SIGNATURE_DOMAIN.len() + payload.len());
        message.extend_from_slice(COMMAND_SIGNATURE_DOMAIN);
        message.extend_from_slice(payload);
        self.signing_key.sign(&message)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("signer", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Who may issue commands, and how fresh a command must be.
#[derive(Clone, Debug)]
pub struct TrustPolicy {
    authorized: HashSet<[u8; 32]>,
    freshness_window: Duration,
}

impl TrustPolicy {
    pub fn new(freshness_window: Duration) -> Self {
        Self {
            authorized: HashSet::new(),
            freshness_window,
        }
    }

    pub fn authorize(mut self, signer: [u8; 32]) -> Self {
        self.authorized.insert(signer);
        self
    }

    pub fn is_authorized(&self, signer: &[u8; 32]) -> bool {
        self.authorized.contains(signer)
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW)
    }
}

/// Verifies signed command envelopes against a [`TrustPolicy`].
/// Side-effect free; the surrounding handle owns what happens on rejection.
#[derive(Clone, Debug)]
pub struct CommandValidator {
    policy: TrustPolicy,
}

impl CommandValidator {
    pub fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    pub fn validate(&self, envelope: &CommandEnvelope) -> Result<(), AuthError> {
        self.validate_at(envelope, now_ms())
    }

    /// Validation against an explicit clock, for deterministic tests.
    pub fn validate_at(&self, envelope: &CommandEnvelope, now_ms: u64) -> Result<(), AuthError> {
        if envelope.signature.is_empty() {
            return Err(AuthError::Unsigned);
        }

        if !self.policy.is_authorized(&envelope.signer) {
            debug!(signer = %hex::encode(envelope.signer), "rejecting command from unknown signer");
            return Err(AuthError::UnknownSigner);
        }

        let window_ms = self.policy.freshness_window.as_millis() as u64;
        let drift = now_ms.abs_diff(envelope.timestamp_ms);
        if drift > window_ms {
            debug!(
                drift_ms = drift,
                window_ms = window_ms,
                "rejecting command with stale timestamp"
            );
            return Err(AuthError::StaleTimestamp);
        }

        let verifying_key =
            VerifyingKey::from_bytes(&envelope.signer).map_err(|_| AuthError::BadSignature)?;
        let signature_bytes: [u8; 64] = envelope
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::BadSignature)?;
        let signature = Signature::from_bytes(&signature_bytes);

        let mut message = Vec::new();
        message.extend_from_slice(COMMAND_SIGNATURE_DOMAIN);
        message.extend_from_slice(&envelope.signed_payload());

        verifying_key
            .verify(&message, &signature)
            .map_err(|_| AuthError::BadSignature)
    }
}

/// Client-side command construction: signs envelopes and allocates process
/// ids from a local counter.
#[derive(Debug)]
pub struct CommandIssuer {
    keypair: Keypair,
    next_process_id: u64,
    next_nonce: u64,
}

impl CommandIssuer {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            next_process_id: 1,
            next_nonce: 1,
        }
    }

    pub fn signer(&self) -> [u8; 32] {
        self.keypair.public_key_bytes()
    }

    /// Allocate the next process id. Ids correlate a command with its
    /// outcome; distinct commands for the same target must use distinct ids
    /// unless the issuer intends them to collapse.
    pub fn next_process_id(&mut self) -> u64 {
        let id = self.next_process_id;
        self.next_process_id += 1;
        id
    }

    pub fn sign_command(
        &mut self,
        prefix: &Name,
        verb: CommandVerb,
        parameter: &CommandParameter,
    ) -> CommandEnvelope {
        self.sign_command_at(prefix, verb, parameter, now_ms())
    }

    /// Sign with an explicit timestamp, for deterministic tests.
    pub fn sign_command_at(
        &mut self,
        prefix: &Name,
        verb: CommandVerb,
        parameter: &CommandParameter,
        timestamp_ms: u64,
    ) -> CommandEnvelope {
        self.sign_raw(prefix, verb, encode_parameter(parameter), timestamp_ms)
    }

    /// Sign an envelope around raw parameter bytes. The issuer does not
    /// check that the block decodes; the repository does.
    pub fn sign_raw(
        &mut self,
        prefix: &Name,
        verb: CommandVerb,
        parameter: Vec<u8>,
        timestamp_ms: u64,
    ) -> CommandEnvelope {
        let nonce = self.next_nonce;
        self.next_nonce += 1;

        let mut envelope = CommandEnvelope {
            prefix: prefix.clone(),
            verb,
            parameter,
            timestamp_ms,
            nonce,
            signer: self.keypair.public_key_bytes(),
            signature: Vec::new(),
        };
        let signature = self.keypair.sign_domain(&envelope.signed_payload());
        envelope.signature = signature.to_bytes().to_vec();
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer_and_validator() -> (CommandIssuer, CommandValidator) {
        let keypair = Keypair::generate();
        let policy = TrustPolicy::default().authorize(keypair.public_key_bytes());
        (CommandIssuer::new(keypair), CommandValidator::new(policy))
    }

    fn parameter() -> CommandParameter {
        CommandParameter::new(Name::from_uri("/repo/data/X"), 1)
    }

    #[test]
    fn signed_command_accepted() {
        let (mut issuer, validator) = issuer_and_validator();
        let envelope = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000,
        );
        assert_eq!(validator.validate_at(&envelope, 1_000_000), Ok(()));
    }

    #[test]
    fn unsigned_command_rejected() {
        let (mut issuer, validator) = issuer_and_validator();
        let mut envelope = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000,
        );
        envelope.signature.clear();
        assert_eq!(
            validator.validate_at(&envelope, 1_000_000),
            Err(AuthError::Unsigned)
        );
    }

    #[test]
    fn unknown_signer_rejected() {
        let (mut issuer, _) = issuer_and_validator();
        let envelope = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000,
        );
        // Validator trusts a different key entirely.
        let other = Keypair::generate();
        let validator =
            CommandValidator::new(TrustPolicy::default().authorize(other.public_key_bytes()));
        assert_eq!(
            validator.validate_at(&envelope, 1_000_000),
            Err(AuthError::UnknownSigner)
        );
    }

    #[test]
    fn stale_timestamp_rejected() {
        let (mut issuer, validator) = issuer_and_validator();
        let envelope = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000,
        );
        let window = DEFAULT_FRESHNESS_WINDOW.as_millis() as u64;
        assert_eq!(
            validator.validate_at(&envelope, 1_000_000 + window + 1),
            Err(AuthError::StaleTimestamp)
        );
        // Commands from the future beyond the window are equally stale.
        let future = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000 + window + 1,
        );
        assert_eq!(
            validator.validate_at(&future, 1_000_000),
            Err(AuthError::StaleTimestamp)
        );
    }

    #[test]
    fn tampered_envelope_rejected() {
        let (mut issuer, validator) = issuer_and_validator();
        let mut envelope = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000,
        );
        envelope.verb = CommandVerb::Delete;
        assert_eq!(
            validator.validate_at(&envelope, 1_000_000),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn truncated_signature_rejected() {
        let (mut issuer, validator) = issuer_and_validator();
        let mut envelope = issuer.sign_command_at(
            &Name::from_uri("/repo"),
            CommandVerb::Insert,
            &parameter(),
            1_000_000,
        );
        envelope.signature.truncate(10);
        assert_eq!(
            validator.validate_at(&envelope, 1_000_000),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn process_ids_are_sequential() {
        let (mut issuer, _) = issuer_and_validator();
        let first = issuer.next_process_id();
        let second = issuer.next_process_id();
        assert_eq!(second, first + 1);
    }
}
