//! Write path: batch registration, removal, root publication and reconciliation.
//!
//! Every write to the mirror happens after the matching chain transaction is confirmed.
//! If the mirror then fails, the chain is ahead of the mirror; the caller gets a
//! [`RegistryError::ReconciliationFault`] and [`VoterRegistrySync::reconcile`] repairs the
//! mirror from the contract's event log. Chain writes are never retried here.
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    audit::{AuditAction, AuditRecord, AuditSink},
    chain::{ReadRetry, RegistryContract, RegistryEventKind, TxReceipt},
    errors::RegistryError,
    hasher::{FieldHasher, PoseidonHasher},
    leaf::{LeafEncoder, VoterIdentifier},
    path::MerkleTree,
    store::{MirrorStore, RegisteredVoter},
    ElectionId, FieldElement,
};
use crate::config::RegistryConfig;

/// Whether roots are published by the service or left to an operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishPolicy {
    /// `setMerkleRoot` after every successful write.
    #[default]
    Automatic,
    /// The new root is reported, never sent.
    Operator,
}

/// Why an input of a batch was left out. Rejections never fail the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Not 64 hex digits.
    Malformed,
    /// Not below the field modulus.
    OutOfRange,
    /// Appeared earlier in the same batch.
    DuplicateInBatch,
    /// Already registered for the election, in the mirror or on-chain.
    AlreadyRegistered,
}

///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Position of the input in the submitted batch.
    pub position: usize,
    pub reason: RejectReason,
}

/// What happened to the election root after a write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RootPublication {
    /// Nothing was written, or the election has no voters left.
    #[default]
    NotAttempted,
    Published { root: FieldElement, tx: TxReceipt },
    /// Operator policy: the root an operator should publish.
    Pending { root: FieldElement },
    /// The write stands; publishing its root did not succeed.
    Failed {
        root: Option<FieldElement>,
        reason: String,
    },
}

/// Result of [`VoterRegistrySync::register_batch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Registered identifiers, in submission order.
    pub accepted: Vec<FieldElement>,
    pub rejected: Vec<Rejection>,
    /// `None` when nothing was accepted and the chain was not called.
    pub tx: Option<TxReceipt>,
    pub root: RootPublication,
}

/// Result of [`VoterRegistrySync::remove_voter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalOutcome {
    pub tx: TxReceipt,
    pub root: RootPublication,
}

/// Result of [`VoterRegistrySync::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub election_id: ElectionId,
    /// Identifiers found on-chain but missing from the mirror.
    pub added: usize,
    /// Mirror records with no live on-chain registration.
    pub removed: usize,
    /// Voters in the mirror afterwards.
    pub total: usize,
    /// Root of the rebuilt set, handled per [`PublishPolicy`].
    pub root: RootPublication,
}

/// Keeps the registry contract and the mirror store in step.
pub struct VoterRegistrySync<H: FieldHasher = PoseidonHasher> {
    contract: Arc<dyn RegistryContract>,
    mirror: Arc<dyn MirrorStore>,
    audit: Arc<dyn AuditSink>,
    encoder: LeafEncoder<H>,
    policy: PublishPolicy,
    retry: ReadRetry,
    locks: Mutex<HashMap<ElectionId, Arc<Mutex<()>>>>,
}

impl VoterRegistrySync<PoseidonHasher> {
    /// Wires the hash scheme, publication policy and read retries from `config`.
    pub fn from_config(
        config: &RegistryConfig,
        contract: Arc<dyn RegistryContract>,
        mirror: Arc<dyn MirrorStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        VoterRegistrySync::new(
            contract,
            mirror,
            audit,
            LeafEncoder::new(config.hash_scheme.hasher()),
        )
        .with_policy(config.root_publication)
        .with_read_retry(config.chain.read_retry())
    }
}

impl<H: FieldHasher> VoterRegistrySync<H> {
    ///
    pub fn new(
        contract: Arc<dyn RegistryContract>,
        mirror: Arc<dyn MirrorStore>,
        audit: Arc<dyn AuditSink>,
        encoder: LeafEncoder<H>,
    ) -> Self {
        VoterRegistrySync {
            contract,
            mirror,
            audit,
            encoder,
            policy: PublishPolicy::default(),
            retry: ReadRetry::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    ///
    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    ///
    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = retry;
        self
    }

    ///
    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    // Entries only the map still references belong to no running operation and are dropped.
    fn election_lock(&self, election_id: ElectionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|id, lock| *id == election_id || Arc::strong_count(lock) > 1);
        locks.entry(election_id).or_default().clone()
    }

    /// Validates `identifiers`, registers the valid ones in one transaction and mirrors them.
    ///
    /// Fails as a whole only when the chain transaction fails (nothing is mirrored), when a
    /// pre-flight read fails, or when the mirror write fails after the transaction
    /// ([`RegistryError::ReconciliationFault`]).
    pub fn register_batch(
        &self,
        election_id: ElectionId,
        identifiers: &[&str],
    ) -> Result<BatchOutcome, RegistryError> {
        let lock = self.election_lock(election_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = BTreeSet::new();
        for (position, input) in identifiers.iter().enumerate() {
            let reason = match self.validate(election_id, input, &mut seen)? {
                Ok(x) => {
                    accepted.push(x);
                    continue;
                }
                Err(reason) => reason,
            };
            rejected.push(Rejection { position, reason });
        }
        if !rejected.is_empty() {
            tracing::info!(election_id, rejected = rejected.len(), "rejected batch inputs");
        }

        if accepted.is_empty() {
            return Ok(BatchOutcome {
                accepted,
                rejected,
                tx: None,
                root: RootPublication::NotAttempted,
            });
        }

        let hashes: Vec<String> = accepted.iter().map(FieldElement::to_hex).collect();
        let tx = self
            .contract
            .batch_register_voters(election_id, &hashes)
            .map_err(|err| {
                tracing::error!(election_id, count = hashes.len(), error = %err, "batch registration failed");
                RegistryError::from(err)
            })?;
        tracing::info!(election_id, count = accepted.len(), tx = %tx.tx_hash, "registered voters on-chain");

        if let Err(err) = self.mirror.insert_batch(election_id, &accepted, Utc::now()) {
            tracing::error!(election_id, tx = %tx.tx_hash, error = %err, "mirror write failed after registration");
            return Err(RegistryError::ReconciliationFault {
                election_id,
                tx_hash: tx.tx_hash,
                reason: err.to_string(),
            });
        }

        for _ in &accepted {
            self.audit.record(AuditRecord::new(
                election_id,
                AuditAction::VoterRegistered,
                Some(tx.tx_hash.clone()),
            ));
        }

        let root = self.refresh_root(election_id);
        Ok(BatchOutcome {
            accepted,
            rejected,
            tx: Some(tx),
            root,
        })
    }

    // Outer error: a read failed. Inner error: the input is rejected.
    fn validate(
        &self,
        election_id: ElectionId,
        input: &str,
        seen: &mut BTreeSet<FieldElement>,
    ) -> Result<Result<FieldElement, RejectReason>, RegistryError> {
        let identifier = match VoterIdentifier::parse(input) {
            Ok(identifier) => identifier,
            Err(_) => return Ok(Err(RejectReason::Malformed)),
        };
        let x = match self.encoder.encode_identifier(&identifier) {
            Ok(x) => x,
            Err(_) => return Ok(Err(RejectReason::OutOfRange)),
        };
        if !seen.insert(x) {
            return Ok(Err(RejectReason::DuplicateInBatch));
        }
        if self.mirror.contains(election_id, &x)? {
            return Ok(Err(RejectReason::AlreadyRegistered));
        }
        let hex = x.to_hex();
        let on_chain = self.retry.read("is_registered_voter", || {
            self.contract.is_registered_voter(election_id, &hex)
        })?;
        if on_chain {
            tracing::warn!(election_id, "identifier registered on-chain but missing from mirror");
            return Ok(Err(RejectReason::AlreadyRegistered));
        }
        Ok(Ok(x))
    }

    /// Removes one voter on-chain, then from the mirror.
    pub fn remove_voter(
        &self,
        election_id: ElectionId,
        identifier: &str,
    ) -> Result<RemovalOutcome, RegistryError> {
        let identifier = VoterIdentifier::parse(identifier)?;
        let x = self.encoder.encode_identifier(&identifier)?;

        let lock = self.election_lock(election_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let hex = x.to_hex();
        let on_chain = self.retry.read("is_registered_voter", || {
            self.contract.is_registered_voter(election_id, &hex)
        })?;
        if !on_chain && !self.mirror.contains(election_id, &x)? {
            return Err(RegistryError::NotRegistered(election_id));
        }

        let tx = self.contract.remove_voter(election_id, &hex)?;
        tracing::info!(election_id, tx = %tx.tx_hash, "removed voter on-chain");

        if let Err(err) = self.mirror.remove(election_id, &x) {
            tracing::error!(election_id, tx = %tx.tx_hash, error = %err, "mirror delete failed after removal");
            return Err(RegistryError::ReconciliationFault {
                election_id,
                tx_hash: tx.tx_hash,
                reason: err.to_string(),
            });
        }
        self.audit.record(AuditRecord::new(
            election_id,
            AuditAction::VoterRemoved,
            Some(tx.tx_hash.clone()),
        ));

        let root = self.refresh_root(election_id);
        Ok(RemovalOutcome { tx, root })
    }

    /// Recomputes the root from the mirror and publishes it, regardless of policy.
    pub fn publish_root(
        &self,
        election_id: ElectionId,
    ) -> Result<(FieldElement, TxReceipt), RegistryError> {
        let lock = self.election_lock(election_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let root = self
            .compute_root(election_id)?
            .ok_or(RegistryError::NoRegistryForElection(election_id))?;
        let tx = self.send_root(election_id, root)?;
        Ok((root, tx))
    }

    /// The root of the mirrored set, or `None` if the election has no voters.
    pub fn compute_root(&self, election_id: ElectionId) -> Result<Option<FieldElement>, RegistryError> {
        let identifiers = self.mirror.identifiers(election_id)?;
        if identifiers.is_empty() {
            return Ok(None);
        }
        let tree = MerkleTree::build(self.encoder.hasher(), self.encoder.leaves(&identifiers))?;
        Ok(Some(tree.root()))
    }

    fn send_root(&self, election_id: ElectionId, root: FieldElement) -> Result<TxReceipt, RegistryError> {
        let tx = self.contract.set_merkle_root(election_id, &root.to_hex())?;
        tracing::info!(election_id, root = %root, tx = %tx.tx_hash, "published merkle root");
        self.audit.record(AuditRecord::new(
            election_id,
            AuditAction::RootPublished,
            Some(tx.tx_hash.clone()),
        ));
        Ok(tx)
    }

    fn refresh_root(&self, election_id: ElectionId) -> RootPublication {
        let root = match self.compute_root(election_id) {
            Ok(Some(root)) => root,
            Ok(None) => return RootPublication::NotAttempted,
            Err(err) => {
                tracing::warn!(election_id, error = %err, "could not recompute merkle root");
                return RootPublication::Failed {
                    root: None,
                    reason: err.to_string(),
                };
            }
        };
        match self.policy {
            PublishPolicy::Operator => RootPublication::Pending { root },
            PublishPolicy::Automatic => match self.send_root(election_id, root) {
                Ok(tx) => RootPublication::Published { root, tx },
                Err(err) => {
                    tracing::warn!(election_id, root = %root, error = %err, "root publication failed");
                    RootPublication::Failed {
                        root: Some(root),
                        reason: err.to_string(),
                    }
                }
            },
        }
    }

    /// Rebuilds the mirrored set of an election from the contract's events.
    ///
    /// Events are applied in `(block, log index)` order, which becomes the canonical leaf
    /// order. Records that survive keep their original `registered_at`.
    pub fn reconcile(&self, election_id: ElectionId) -> Result<ReconcileReport, RegistryError> {
        let lock = self.election_lock(election_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut events = self.retry.read("registry_events", || {
            self.contract.registry_events(election_id)
        })?;
        events.sort_by_key(|e| (e.block_number, e.log_index));

        // Removed slots stay as `None` so positions in `slots` stay valid.
        let mut slots: Vec<Option<FieldElement>> = Vec::new();
        let mut position: HashMap<FieldElement, usize> = HashMap::new();
        for event in &events {
            let x = FieldElement::from_hex(&event.identifier)?;
            match event.kind {
                RegistryEventKind::VoterRegistered => {
                    if !position.contains_key(&x) {
                        position.insert(x, slots.len());
                        slots.push(Some(x));
                    }
                }
                RegistryEventKind::VoterRemoved => {
                    if let Some(p) = position.remove(&x) {
                        slots[p] = None;
                    }
                }
            }
        }
        let live: Vec<FieldElement> = slots.into_iter().flatten().collect();

        let existing: HashMap<FieldElement, RegisteredVoter> = self
            .mirror
            .voters(election_id)?
            .into_iter()
            .map(|v| (v.identifier, v))
            .collect();
        let now = Utc::now();
        let mut added = 0;
        let voters: Vec<RegisteredVoter> = live
            .iter()
            .map(|x| match existing.get(x) {
                Some(voter) => voter.clone(),
                None => {
                    added += 1;
                    RegisteredVoter {
                        election_id,
                        identifier: *x,
                        registered_at: now,
                    }
                }
            })
            .collect();
        let removed = existing.len() + added - voters.len();

        self.mirror.replace_election(election_id, &voters)?;
        tracing::info!(election_id, added, removed, total = voters.len(), "reconciled mirror");

        // The chain registered these without a matching record here.
        for _ in 0..added {
            self.audit
                .record(AuditRecord::new(election_id, AuditAction::VoterRegistered, None));
        }

        let root = self.refresh_root(election_id);
        Ok(ReconcileReport {
            election_id,
            added,
            removed,
            total: voters.len(),
            root,
        })
    }
}
