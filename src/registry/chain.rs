//! Boundary to the on-chain voter registry contract.
//!
//! Identifier hashes and roots cross this boundary as `0x`-prefixed 32-byte hex strings.
//! Nothing returned by a contract is trusted before it has been parsed into a
//! [`FieldElement`](super::FieldElement) on our side.
use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ElectionId;

///
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The transaction was mined and reverted.
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    ///
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    /// No answer within the request timeout, in milliseconds.
    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

impl ChainError {
    /// Whether repeating the same read can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Unavailable(_) | ChainError::Timeout(_))
    }
}

/// A confirmed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: u64,
}

///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEventKind {
    VoterRegistered,
    VoterRemoved,
}

/// A registry log entry. `(block_number, log_index)` orders events totally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub identifier: String,
    pub block_number: u64,
    pub log_index: u32,
}

/// The registry contract as seen from this crate.
///
/// Implementations apply their own request timeout and report it as [`ChainError::Timeout`].
/// Write methods return once the transaction is confirmed.
pub trait RegistryContract: Send + Sync {
    ///
    fn register_voter(&self, election_id: ElectionId, identifier: &str)
        -> Result<TxReceipt, ChainError>;

    /// Registers all identifiers in one transaction. Reverts as a whole if any is already
    /// registered.
    fn batch_register_voters(
        &self,
        election_id: ElectionId,
        identifiers: &[String],
    ) -> Result<TxReceipt, ChainError>;

    ///
    fn remove_voter(&self, election_id: ElectionId, identifier: &str)
        -> Result<TxReceipt, ChainError>;

    ///
    fn set_merkle_root(&self, election_id: ElectionId, root: &str) -> Result<TxReceipt, ChainError>;

    ///
    fn is_registered_voter(&self, election_id: ElectionId, identifier: &str)
        -> Result<bool, ChainError>;

    /// The last published root, if any.
    fn merkle_root(&self, election_id: ElectionId) -> Result<Option<String>, ChainError>;

    /// Registration and removal events of an election, in any order.
    fn registry_events(&self, election_id: ElectionId) -> Result<Vec<RegistryEvent>, ChainError>;
}

/// Retry policy for idempotent chain reads. Writes never go through it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRetry {
    attempts: u32,
    backoff: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        ReadRetry {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl ReadRetry {
    /// At least one attempt is always made.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        ReadRetry {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    ///
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Runs `read` until it succeeds, fails permanently, or attempts run out. The backoff
    /// grows linearly with the attempt number.
    pub fn read<T>(
        &self,
        op: &str,
        mut read: impl FnMut() -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        let mut attempt = 1;
        loop {
            match read() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    tracing::warn!(op, attempt, error = %err, "chain read failed, retrying");
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(any(test, feature = "test-dependencies"))]
pub use self::testing::InMemoryRegistryContract;

#[cfg(any(test, feature = "test-dependencies"))]
mod testing {
    use std::{
        collections::{BTreeSet, HashMap},
        sync::{Mutex, MutexGuard, PoisonError},
    };

    use super::*;

    #[derive(Default)]
    struct State {
        registered: HashMap<ElectionId, BTreeSet<String>>,
        roots: HashMap<ElectionId, String>,
        events: HashMap<ElectionId, Vec<RegistryEvent>>,
        block: u64,
        transactions: u64,
        fail_next_write: Option<ChainError>,
        failing_reads: u32,
    }

    impl State {
        fn check_write(&mut self) -> Result<(), ChainError> {
            match self.fail_next_write.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn check_read(&mut self) -> Result<(), ChainError> {
            if self.failing_reads > 0 {
                self.failing_reads -= 1;
                return Err(ChainError::Unavailable("injected read failure".into()));
            }
            Ok(())
        }

        fn mine(&mut self) -> TxReceipt {
            self.block += 1;
            self.transactions += 1;
            TxReceipt {
                tx_hash: format!("0x{:064x}", self.transactions),
                block_number: self.block,
            }
        }
    }

    /// Contract double. Every write is mined in its own block; events of one transaction
    /// share the block and get increasing log indexes.
    #[derive(Default)]
    pub struct InMemoryRegistryContract {
        state: Mutex<State>,
    }

    impl InMemoryRegistryContract {
        ///
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// The next write fails with `err` and changes nothing.
        pub fn fail_next_write(&self, err: ChainError) {
            self.state().fail_next_write = Some(err);
        }

        /// The next `count` reads fail with [`ChainError::Unavailable`].
        pub fn fail_reads(&self, count: u32) {
            self.state().failing_reads = count;
        }

        /// Number of transactions mined so far.
        pub fn transaction_count(&self) -> u64 {
            self.state().transactions
        }

        ///
        pub fn registered(&self, election_id: ElectionId) -> Vec<String> {
            self.state()
                .registered
                .get(&election_id)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default()
        }
    }

    impl RegistryContract for InMemoryRegistryContract {
        fn register_voter(
            &self,
            election_id: ElectionId,
            identifier: &str,
        ) -> Result<TxReceipt, ChainError> {
            self.batch_register_voters(election_id, &[identifier.to_string()])
        }

        fn batch_register_voters(
            &self,
            election_id: ElectionId,
            identifiers: &[String],
        ) -> Result<TxReceipt, ChainError> {
            let mut state = self.state();
            state.check_write()?;
            let registered = state.registered.entry(election_id).or_default();
            let mut batch = BTreeSet::new();
            for identifier in identifiers {
                if registered.contains(identifier) || !batch.insert(identifier.as_str()) {
                    return Err(ChainError::Reverted {
                        reason: "AlreadyRegistered".into(),
                    });
                }
            }
            registered.extend(identifiers.iter().cloned());

            let receipt = state.mine();
            let events = state.events.entry(election_id).or_default();
            for (log_index, identifier) in identifiers.iter().enumerate() {
                events.push(RegistryEvent {
                    kind: RegistryEventKind::VoterRegistered,
                    identifier: identifier.clone(),
                    block_number: receipt.block_number,
                    log_index: log_index as u32,
                });
            }
            Ok(receipt)
        }

        fn remove_voter(
            &self,
            election_id: ElectionId,
            identifier: &str,
        ) -> Result<TxReceipt, ChainError> {
            let mut state = self.state();
            state.check_write()?;
            let removed = state
                .registered
                .get_mut(&election_id)
                .map(|ids| ids.remove(identifier))
                .unwrap_or(false);
            if !removed {
                return Err(ChainError::Reverted {
                    reason: "NotRegistered".into(),
                });
            }

            let receipt = state.mine();
            state.events.entry(election_id).or_default().push(RegistryEvent {
                kind: RegistryEventKind::VoterRemoved,
                identifier: identifier.to_string(),
                block_number: receipt.block_number,
                log_index: 0,
            });
            Ok(receipt)
        }

        fn set_merkle_root(
            &self,
            election_id: ElectionId,
            root: &str,
        ) -> Result<TxReceipt, ChainError> {
            let mut state = self.state();
            state.check_write()?;
            state.roots.insert(election_id, root.to_string());
            Ok(state.mine())
        }

        fn is_registered_voter(
            &self,
            election_id: ElectionId,
            identifier: &str,
        ) -> Result<bool, ChainError> {
            let mut state = self.state();
            state.check_read()?;
            Ok(state
                .registered
                .get(&election_id)
                .map(|ids| ids.contains(identifier))
                .unwrap_or(false))
        }

        fn merkle_root(&self, election_id: ElectionId) -> Result<Option<String>, ChainError> {
            let mut state = self.state();
            state.check_read()?;
            Ok(state.roots.get(&election_id).cloned())
        }

        fn registry_events(
            &self,
            election_id: ElectionId,
        ) -> Result<Vec<RegistryEvent>, ChainError> {
            let mut state = self.state();
            state.check_read()?;
            let mut events = state.events.get(&election_id).cloned().unwrap_or_default();
            // real log queries come back newest first
            events.reverse();
            Ok(events)
        }
    }
}
