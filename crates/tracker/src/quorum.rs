//! Quorum pool: signed messages bucketed by the subject hash they attest to.
//!
//! Messages are deduplicated by signature bytes only; signatures are not verified. Subjects are
//! created on first insert and never expire; pruning is up to the caller ([QuorumPool::remove],
//! [QuorumPool::clear]).

use alloy::primitives::{Bytes, B256};
use std::collections::{HashMap, HashSet};

/// One signed observation about a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage<P> {
    pub signature: Bytes,
    pub payload: P,
}

impl<P> SignedMessage<P> {
    pub fn new(signature: impl Into<Bytes>, payload: P) -> Self {
        Self {
            signature: signature.into(),
            payload,
        }
    }
}

/// Messages for one subject, unique by signature, in insertion order.
#[derive(Debug, Clone)]
struct MessageSet<P> {
    messages: Vec<SignedMessage<P>>,
    signatures: HashSet<Bytes>,
}

impl<P> MessageSet<P> {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            signatures: HashSet::new(),
        }
    }

    fn add(&mut self, message: SignedMessage<P>) -> bool {
        if !self.signatures.insert(message.signature.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Clone)]
pub struct QuorumPool<P> {
    subjects: HashMap<B256, MessageSet<P>>,
}

impl<P> Default for QuorumPool<P> {
    fn default() -> Self {
        Self {
            subjects: HashMap::new(),
        }
    }
}

impl<P> QuorumPool<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `message` for `subject`. Returns false if the same signature was already recorded.
    pub fn add(&mut self, subject: B256, message: SignedMessage<P>) -> bool {
        self.subjects
            .entry(subject)
            .or_insert_with(MessageSet::new)
            .add(message)
    }

    /// Messages of a subject whose distinct-signature count satisfies `quorum`.
    ///
    /// Subjects are scanned in hash-map order: when several qualify, which one is returned is
    /// unspecified.
    pub fn messages_reaching_quorum<F>(&self, quorum: F) -> Option<&[SignedMessage<P>]>
    where
        F: Fn(u64) -> bool,
    {
        self.subjects
            .values()
            .find(|set| quorum(set.messages.len() as u64))
            .map(|set| set.messages.as_slice())
    }

    pub fn messages_for(&self, subject: &B256) -> Option<&[SignedMessage<P>]> {
        self.subjects.get(subject).map(|set| set.messages.as_slice())
    }

    /// Number of subjects.
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn remove(&mut self, subject: &B256) -> Option<Vec<SignedMessage<P>>> {
        self.subjects.remove(subject).map(|set| set.messages)
    }

    pub fn clear(&mut self) {
        self.subjects.clear();
    }
}
