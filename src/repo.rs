//! # Repository Core
//!
//! This module wires the command pipeline together: a [`Repo`] facade hands
//! transport-delivered command bytes to a single actor task that owns every
//! piece of mutable state (the pending-insert table and the storage engine),
//! so no locking exists inside the core.
//!
//! ## Command flow
//!
//! ```text
//! bytes -> validate -> decode -> ack -> [insert] fetch rounds -> put
//!                                       [delete] remove
//! ```
//!
//! ## Insert state machine
//!
//! `Received -> Accepted -> Fetching -> Persisted`, with terminal failures
//! `Rejected` (validation/decoding) and `FetchFailed` (retry exhaustion).
//! The `100` ack is sent on acceptance, before any content moves; completion
//! is silent on the command channel.
//!
//! Each pending insert is keyed by `(target name, process id)` and carries a
//! generation number identifying its current attempt round. Fetch
//! completions and timer firings arrive as events tagged with key and
//! generation; anything stale is discarded, which is how superseded fetches
//! die without transport-level cancellation.
//!
//! ## Delete state machine
//!
//! `Received -> Accepted -> Removed`. The `200` ack is sent on acceptance;
//! removal of an absent name completes as a no-op. A storage failure
//! reschedules the removal a bounded number of times, then gives up with a
//! log line; no later failure retracts the ack.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::face::{Face, FetchError};
use crate::fetch::{assemble_segments, FetchPipeline};
use crate::messages::{
    decode_envelope, decode_parameter, encode_response, CommandEnvelope, CommandParameter,
    CommandResponse, CommandVerb, ContentObject, MAX_PAYLOAD_SIZE, STATUS_MALFORMED, STATUS_OK,
    STATUS_PROCESSING, STATUS_UNAUTHORIZED,
};
use crate::name::Name;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::storage::{Selector, Storage, StorageRecord};
use crate::validator::CommandValidator;

/// Upper bound on segments in one insert command.
/// Bounds the per-round fan-out a single command can demand.
const MAX_SEGMENT_SPAN: u64 = 1024;

/// Actor channel depth; transport backpressure applies beyond this.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// What to do with commands that fail validation or decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionPolicy {
    /// Drop silently: the network's "no Data for an invalid Interest"
    /// convention.
    Silent,
    /// Answer with `401` (auth) or `403` (malformed).
    Respond,
}

/// Tunables for the command pipeline.
#[derive(Clone, Debug)]
pub struct RepoConfig {
    /// Name prefix commands are addressed to. Commands under a different
    /// prefix are dropped before validation.
    pub prefix: Name,
    /// Additional fetch attempts after the first, per insert.
    pub retry_max: usize,
    /// Repository-side bound on one fetch attempt; firing consumes a retry.
    pub attempt_timeout: Duration,
    pub rejection: RejectionPolicy,
    /// Additional attempts for a storage remove that failed.
    pub delete_retry_max: usize,
    pub delete_retry_delay: Duration,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            prefix: Name::from_uri("/repo"),
            retry_max: 3,
            attempt_timeout: Duration::from_secs(2),
            rejection: RejectionPolicy::Silent,
            delete_retry_max: 2,
            delete_retry_delay: Duration::from_millis(100),
        }
    }
}

/// `(target name, process id)`: the identity of one logical pending insert.
type PendingKey = (Name, u64);

/// Reassembly state for a segmented insert.
struct SegmentAssembly {
    start: u64,
    end: u64,
    parts: HashMap<u64, Vec<u8>>,
}

impl SegmentAssembly {
    fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            parts: HashMap::new(),
        }
    }

    fn missing_names(&self, target: &Name) -> Vec<Name> {
        (self.start..=self.end)
            .filter(|segment| !self.parts.contains_key(segment))
            .map(|segment| target.append_segment(segment))
            .collect()
    }
}

/// Per in-flight insert command. Exists for a given key at most once;
/// removed on completion, failure, timeout exhaustion, or supersession.
struct PendingInsert {
    /// Identifies the current attempt round; stale events are discarded.
    generation: u64,
    retries_remaining: usize,
    /// Guards the current round. Replaced on every retry and on a
    /// superseding command for the same key; dropping it cancels the timer.
    timeout: TimerHandle,
    assembly: Option<SegmentAssembly>,
}

enum Event {
    CommandReceived(Vec<u8>),
    FetchRoundDone {
        key: PendingKey,
        generation: u64,
        results: Vec<(Name, Result<ContentObject, FetchError>)>,
    },
    AttemptTimedOut {
        key: PendingKey,
        generation: u64,
    },
    RetryDelete {
        name: Name,
        attempts_remaining: usize,
    },
    Lookup {
        name: Name,
        selector: Selector,
        reply: oneshot::Sender<Option<StorageRecord>>,
    },
    PendingCount {
        reply: oneshot::Sender<usize>,
    },
    Quit,
}

/// Handle to a running repository core. Cheap to clone; all operations are
/// messages to the actor task.
#[derive(Clone)]
pub struct Repo {
    tx: mpsc::Sender<Event>,
}

impl Repo {
    /// Start the repository actor over the given collaborators.
    pub fn spawn<F, S>(face: F, storage: S, validator: CommandValidator, config: RepoConfig) -> Self
    where
        F: Face + Clone,
        S: Storage,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let actor = RepoActor {
            pipeline: FetchPipeline::new(face.clone()),
            face,
            storage,
            validator,
            scheduler: Scheduler::new(tx.clone()),
            pending: HashMap::new(),
            next_generation: 0,
            config,
            tx: tx.clone(),
            rx,
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    /// Entry point for the transport's command-received callback.
    pub async fn deliver_command(&self, bytes: Vec<u8>) -> Result<()> {
        self.tx
            .send(Event::CommandReceived(bytes))
            .await
            .context("repository actor stopped")
    }

    /// Query the storage engine through the actor, serialized with command
    /// processing. Storage failures surface as `None`.
    pub async fn lookup(&self, name: &Name, selector: Selector) -> Option<StorageRecord> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Event::Lookup {
                name: name.clone(),
                selector,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Number of insert commands currently pending a fetch.
    pub async fn pending_inserts(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Event::PendingCount { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn quit(&self) {
        let _ = self.tx.send(Event::Quit).await;
    }
}

struct RepoActor<F: Face + Clone, S: Storage> {
    pipeline: FetchPipeline<F>,
    face: F,
    storage: S,
    validator: CommandValidator,
    scheduler: Scheduler<Event>,
    pending: HashMap<PendingKey, PendingInsert>,
    next_generation: u64,
    config: RepoConfig,
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
}

impl<F: Face + Clone, S: Storage> RepoActor<F, S> {
    async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            match event {
                Event::CommandReceived(bytes) => {
                    self.handle_command(&bytes).await;
                }
                Event::FetchRoundDone {
                    key,
                    generation,
                    results,
                } => {
                    self.handle_fetch_round(key, generation, results).await;
                }
                Event::AttemptTimedOut { key, generation } => {
                    self.handle_attempt_timeout(key, generation);
                }
                Event::RetryDelete {
                    name,
                    attempts_remaining,
                } => {
                    self.attempt_delete(name, attempts_remaining).await;
                }
                Event::Lookup {
                    name,
                    selector,
                    reply,
                } => {
                    let record = match self.storage.lookup(&name, selector).await {
                        Ok(record) => record,
                        Err(err) => {
                            warn!(error = %err, name = %name, "storage lookup failed");
                            None
                        }
                    };
                    let _ = reply.send(record);
                }
                Event::PendingCount { reply } => {
                    let _ = reply.send(self.pending.len());
                }
                Event::Quit => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Command dispatch: validate -> decode -> verb handler
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, bytes: &[u8]) {
        let envelope = match decode_envelope(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Nothing to correlate a rejection response with.
                debug!(error = %err, "dropping undecodable command envelope");
                return;
            }
        };

        if !self.config.prefix.is_prefix_of(&envelope.prefix) {
            debug!(prefix = %envelope.prefix, "dropping command for foreign prefix");
            return;
        }

        if let Err(err) = self.validator.validate(&envelope) {
            warn!(
                error = %err,
                verb = envelope.verb.as_str(),
                signer = %hex::encode(envelope.signer),
                "command failed validation"
            );
            self.reject(STATUS_UNAUTHORIZED, &envelope).await;
            return;
        }

        let parameter = match decode_parameter(&envelope.parameter) {
            Ok(parameter) => parameter,
            Err(err) => {
                warn!(error = %err, verb = envelope.verb.as_str(), "command parameter block malformed");
                self.reject(STATUS_MALFORMED, &envelope).await;
                return;
            }
        };

        match envelope.verb {
            CommandVerb::Insert => self.handle_insert(parameter).await,
            CommandVerb::Delete => self.handle_delete(parameter).await,
        }
    }

    async fn reject(&self, status_code: u16, envelope: &CommandEnvelope) {
        if self.config.rejection != RejectionPolicy::Respond {
            return;
        }
        // Best effort: the parameter block may itself be the malformed part.
        let process_id = decode_parameter(&envelope.parameter)
            .map(|parameter| parameter.process_id)
            .unwrap_or(0);
        self.send_response(CommandResponse::new(status_code, process_id))
            .await;
    }

    async fn send_response(&self, response: CommandResponse) {
        if let Err(err) = self.face.send_response(encode_response(&response)).await {
            warn!(
                error = %err,
                status = response.status_code,
                process_id = response.process_id,
                "failed to send command response"
            );
        }
    }

    // ------------------------------------------------------------------
    // Insert handle
    // ------------------------------------------------------------------

    async fn handle_insert(&mut self, parameter: CommandParameter) {
        let CommandParameter {
            target_name,
            process_id,
            segment_range,
        } = parameter;

        if let Some((start, end)) = segment_range {
            // Subtraction form: `end` may sit at the integer limit.
            if end < start || end - start >= MAX_SEGMENT_SPAN {
                warn!(
                    name = %target_name,
                    process_id,
                    start,
                    end,
                    "rejecting insert with invalid segment range"
                );
                if self.config.rejection == RejectionPolicy::Respond {
                    self.send_response(CommandResponse::new(STATUS_MALFORMED, process_id))
                        .await;
                }
                return;
            }
        }

        // Acceptance ack, before anything is fetched or stored.
        self.send_response(CommandResponse::new(STATUS_PROCESSING, process_id))
            .await;

        let key: PendingKey = (target_name.clone(), process_id);

        if let Some(entry) = self.pending.get_mut(&key) {
            // Same key: collapse into the one in-flight fetch,
            // replace-and-cancel the prior timeout, restore the budget.
            debug!(
                name = %target_name,
                process_id,
                "duplicate insert command collapsed onto pending fetch"
            );
            entry.retries_remaining = self.config.retry_max;
            let generation = entry.generation;
            entry.timeout = self.scheduler.schedule_after(
                self.config.attempt_timeout,
                Event::AttemptTimedOut {
                    key: key.clone(),
                    generation,
                },
            );
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;

        let assembly = segment_range.map(|(start, end)| SegmentAssembly::new(start, end));
        let names = match &assembly {
            Some(assembly) => assembly.missing_names(&target_name),
            None => vec![target_name.clone()],
        };

        let timeout = self.scheduler.schedule_after(
            self.config.attempt_timeout,
            Event::AttemptTimedOut {
                key: key.clone(),
                generation,
            },
        );
        self.pending.insert(
            key.clone(),
            PendingInsert {
                generation,
                retries_remaining: self.config.retry_max,
                timeout,
                assembly,
            },
        );

        info!(
            name = %target_name,
            process_id,
            segments = names.len(),
            "insert accepted, fetching"
        );
        self.spawn_fetch_round(key, generation, names);
    }

    fn spawn_fetch_round(&self, key: PendingKey, generation: u64, names: Vec<Name>) {
        let pipeline = self.pipeline.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let results = pipeline.retrieve_many(names).await;
            let _ = tx
                .send(Event::FetchRoundDone {
                    key,
                    generation,
                    results,
                })
                .await;
        });
    }

    async fn handle_fetch_round(
        &mut self,
        key: PendingKey,
        generation: u64,
        results: Vec<(Name, Result<ContentObject, FetchError>)>,
    ) {
        enum Outcome {
            Complete(ContentObject),
            Terminal(FetchError),
            Retry,
            Wait,
        }

        let outcome = {
            let entry = match self.pending.get_mut(&key) {
                Some(entry) if entry.generation == generation => entry,
                _ => {
                    // Superseded or already resolved; fire-and-forget policy
                    // says this completion just evaporates.
                    debug!(name = %key.0, process_id = key.1, "discarding stale fetch completion");
                    return;
                }
            };

            let mut timed_out = false;
            let mut terminal: Option<FetchError> = None;
            let mut simple: Option<ContentObject> = None;

            for (_, result) in results {
                match result {
                    Ok(object) => match entry.assembly.as_mut() {
                        Some(assembly) => {
                            if let Some(segment) = object.name.segment() {
                                assembly.parts.insert(segment, object.payload);
                            }
                        }
                        None => simple = Some(object),
                    },
                    Err(FetchError::Timeout) => timed_out = true,
                    Err(err) => terminal = Some(err),
                }
            }

            if let Some(err) = terminal {
                Outcome::Terminal(err)
            } else if let Some(object) = simple {
                Outcome::Complete(object)
            } else if let Some(assembly) = entry.assembly.as_ref() {
                match assemble_segments(&key.0, assembly.start, assembly.end, &assembly.parts) {
                    Some(object) => Outcome::Complete(object),
                    None if timed_out => Outcome::Retry,
                    None => Outcome::Wait,
                }
            } else if timed_out {
                Outcome::Retry
            } else {
                Outcome::Wait
            }
        };

        match outcome {
            Outcome::Complete(object) => self.complete_insert(key, object).await,
            Outcome::Terminal(err) => {
                warn!(
                    name = %key.0,
                    process_id = key.1,
                    error = %err,
                    "insert failed on terminal fetch error"
                );
                self.pending.remove(&key);
            }
            Outcome::Retry => self.retry_or_fail(key),
            Outcome::Wait => {}
        }
    }

    /// Fetching -> Persisted. The object must carry exactly the name the
    /// command targeted and fit the payload cap; the entry is removed
    /// whatever storage says.
    async fn complete_insert(&mut self, key: PendingKey, object: ContentObject) {
        if object.name != key.0 {
            warn!(
                expected = %key.0,
                received = %object.name,
                "assembled object name mismatch, abandoning insert"
            );
            self.pending.remove(&key);
            return;
        }

        if object.payload.len() > MAX_PAYLOAD_SIZE {
            warn!(
                name = %key.0,
                process_id = key.1,
                bytes = object.payload.len(),
                "assembled object exceeds payload cap, abandoning insert"
            );
            self.pending.remove(&key);
            return;
        }

        match self.storage.put(object.name, object.payload).await {
            Ok(()) => {
                info!(name = %key.0, process_id = key.1, "insert persisted");
            }
            Err(err) => {
                warn!(
                    name = %key.0,
                    process_id = key.1,
                    error = %err,
                    "storage failure, insert abandoned"
                );
            }
        }
        self.pending.remove(&key);
    }

    fn handle_attempt_timeout(&mut self, key: PendingKey, generation: u64) {
        match self.pending.get(&key) {
            Some(entry) if entry.generation == generation => {}
            _ => return,
        }
        debug!(name = %key.0, process_id = key.1, "fetch attempt timed out");
        self.retry_or_fail(key);
    }

    /// Start a fresh attempt round under a new generation, or abandon the
    /// insert when the budget is spent. A new generation orphans whatever
    /// the previous round still delivers.
    fn retry_or_fail(&mut self, key: PendingKey) {
        let round = {
            let Some(entry) = self.pending.get_mut(&key) else {
                return;
            };
            if entry.retries_remaining == 0 {
                None
            } else {
                entry.retries_remaining -= 1;
                self.next_generation += 1;
                let generation = self.next_generation;
                entry.generation = generation;
                let names = match entry.assembly.as_ref() {
                    Some(assembly) => assembly.missing_names(&key.0),
                    None => vec![key.0.clone()],
                };
                entry.timeout = self.scheduler.schedule_after(
                    self.config.attempt_timeout,
                    Event::AttemptTimedOut {
                        key: key.clone(),
                        generation,
                    },
                );
                Some((generation, names))
            }
        };

        match round {
            Some((generation, names)) => {
                debug!(
                    name = %key.0,
                    process_id = key.1,
                    outstanding = names.len(),
                    "retrying fetch"
                );
                self.spawn_fetch_round(key, generation, names);
            }
            None => {
                info!(
                    name = %key.0,
                    process_id = key.1,
                    "insert abandoned after retry exhaustion"
                );
                self.pending.remove(&key);
            }
        }
    }

    // ------------------------------------------------------------------
    // Delete handle
    // ------------------------------------------------------------------

    async fn handle_delete(&mut self, parameter: CommandParameter) {
        // Acceptance ack first; deletion of an absent name is still success.
        self.send_response(CommandResponse::new(STATUS_OK, parameter.process_id))
            .await;
        self.attempt_delete(parameter.target_name, self.config.delete_retry_max)
            .await;
    }

    async fn attempt_delete(&mut self, name: Name, attempts_remaining: usize) {
        match self.storage.remove(&name).await {
            Ok(existed) => {
                info!(name = %name, existed, "delete completed");
            }
            Err(err) if attempts_remaining > 0 => {
                warn!(
                    name = %name,
                    error = %err,
                    attempts_remaining,
                    "storage failure on delete, rescheduling"
                );
                self.scheduler
                    .schedule_after(
                        self.config.delete_retry_delay,
                        Event::RetryDelete {
                            name,
                            attempts_remaining: attempts_remaining - 1,
                        },
                    )
                    .detach();
            }
            Err(err) => {
                warn!(name = %name, error = %err, "delete abandoned after storage failures");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{decode_response, encode_envelope};
    use crate::storage::MemoryStore;
    use crate::validator::{CommandIssuer, Keypair, TrustPolicy};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Face stub that never resolves retrievals and records responses.
    struct DeafFace {
        responses: Mutex<Vec<CommandResponse>>,
    }

    impl DeafFace {
        fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
            }
        }

        async fn responses(&self) -> Vec<CommandResponse> {
            self.responses.lock().await.clone()
        }
    }

    #[async_trait]
    impl Face for DeafFace {
        async fn express_retrieval(&self, _name: &Name) -> Result<ContentObject, FetchError> {
            Err(FetchError::Timeout)
        }

        async fn send_response(&self, response: Vec<u8>) -> anyhow::Result<()> {
            let decoded = decode_response(&response)?;
            self.responses.lock().await.push(decoded);
            Ok(())
        }
    }

    fn setup(rejection: RejectionPolicy) -> (Repo, Arc<DeafFace>, CommandIssuer) {
        let keypair = Keypair::generate();
        let policy = TrustPolicy::default().authorize(keypair.public_key_bytes());
        let face = Arc::new(DeafFace::new());
        let config = RepoConfig {
            rejection,
            attempt_timeout: Duration::from_millis(50),
            ..RepoConfig::default()
        };
        let repo = Repo::spawn(
            face.clone(),
            MemoryStore::new(),
            CommandValidator::new(policy),
            config,
        );
        (repo, face, CommandIssuer::new(keypair))
    }

    fn prefix() -> Name {
        Name::from_uri("/repo")
    }

    #[tokio::test]
    async fn unsigned_command_dropped_silently_by_default() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Silent);

        let mut envelope = issuer.sign_command(
            &prefix(),
            CommandVerb::Insert,
            &CommandParameter::new(Name::from_uri("/repo/data/X"), 1),
        );
        envelope.signature.clear();
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        assert!(face.responses().await.is_empty());
        repo.quit().await;
    }

    #[tokio::test]
    async fn auth_failure_answered_under_respond_policy() {
        let (repo, face, _) = setup(RejectionPolicy::Respond);

        let intruder = Keypair::generate();
        let mut outsider = CommandIssuer::new(intruder);
        let envelope = outsider.sign_command(
            &prefix(),
            CommandVerb::Delete,
            &CommandParameter::new(Name::from_uri("/repo/data/X"), 5),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        // Drain through the actor before inspecting.
        assert_eq!(repo.pending_inserts().await, 0);
        let responses = face.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, STATUS_UNAUTHORIZED);
        assert_eq!(responses[0].process_id, 5);
        repo.quit().await;
    }

    #[tokio::test]
    async fn malformed_parameter_answered_under_respond_policy() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Respond);

        // Validly signed envelope whose parameter block is garbage: passes
        // authentication, fails decoding.
        let envelope = issuer.sign_raw(
            &prefix(),
            CommandVerb::Insert,
            vec![0xFF, 0xFE, 0xFD],
            crate::validator::now_ms(),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        let responses = face.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, STATUS_MALFORMED);
        assert_eq!(responses[0].process_id, 0);
        repo.quit().await;
    }

    #[tokio::test]
    async fn tampered_parameter_fails_authentication_first() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Respond);

        // Parameter block swapped after signing: the signature no longer
        // covers what the envelope carries.
        let mut envelope = issuer.sign_command(
            &prefix(),
            CommandVerb::Insert,
            &CommandParameter::new(Name::from_uri("/repo/data/X"), 1),
        );
        envelope.parameter = vec![0xFF];
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        let responses = face.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, STATUS_UNAUTHORIZED);
        repo.quit().await;
    }

    #[tokio::test]
    async fn foreign_prefix_dropped() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Respond);

        let envelope = issuer.sign_command(
            &Name::from_uri("/other"),
            CommandVerb::Insert,
            &CommandParameter::new(Name::from_uri("/other/data"), 1),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        assert!(face.responses().await.is_empty());
        repo.quit().await;
    }

    #[tokio::test]
    async fn invalid_segment_range_rejected() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Respond);

        let envelope = issuer.sign_command(
            &prefix(),
            CommandVerb::Insert,
            &CommandParameter::with_segments(Name::from_uri("/repo/data/X"), 9, 5, 2),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        let responses = face.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, STATUS_MALFORMED);
        assert_eq!(responses[0].process_id, 9);
        repo.quit().await;
    }

    #[tokio::test]
    async fn segment_range_at_integer_limit_rejected() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Respond);

        let envelope = issuer.sign_command(
            &prefix(),
            CommandVerb::Insert,
            &CommandParameter::with_segments(Name::from_uri("/repo/data/X"), 13, 0, u64::MAX),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        let responses = face.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, STATUS_MALFORMED);
        assert_eq!(responses[0].process_id, 13);

        // The actor survives and keeps serving commands.
        let envelope = issuer.sign_command(
            &prefix(),
            CommandVerb::Delete,
            &CommandParameter::new(Name::from_uri("/repo/data/X"), 14),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();

        assert_eq!(repo.pending_inserts().await, 0);
        let responses = face.responses().await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].status_code, STATUS_OK);
        assert_eq!(responses[1].process_id, 14);
        repo.quit().await;
    }

    #[tokio::test(start_paused = true)]
    async fn insert_acks_processing_even_when_fetch_never_succeeds() {
        let (repo, face, mut issuer) = setup(RejectionPolicy::Silent);

        let envelope = issuer.sign_command(
            &prefix(),
            CommandVerb::Insert,
            &CommandParameter::new(Name::from_uri("/repo/data/X"), 11),
        );
        repo.deliver_command(encode_envelope(&envelope)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        // DeafFace never delivers content: the ack went out anyway, and it
        // stays the only traffic on the command channel.
        let responses = face.responses().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code, STATUS_PROCESSING);
        assert_eq!(responses[0].process_id, 11);
        assert_eq!(repo.pending_inserts().await, 0);
        repo.quit().await;
    }
}
