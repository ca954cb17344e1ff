//! # Credential Store
//!
//! Persistence port keyed by subject id, and the in-memory implementation.
//!
//! ## Security Invariant
//!
//! [`CredentialStore::upsert`] runs its decision closure while holding the
//! subject's entry lock, so concurrent issuers for the same subject are
//! serialized and observe each other's writes. A SQL-backed store gets the
//! same guarantee from `INSERT … ON CONFLICT (subject_id) DO UPDATE` inside
//! one transaction.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use kyc_core::{CredentialId, KycError, SubjectId};

use crate::credential::Credential;

/// What an upsert decided to do with the subject's entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// Store a new credential (only valid when none exists).
    Insert(Credential),
    /// Replace the existing credential.
    Replace(Credential),
    /// Leave the existing credential untouched.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Decision closure for [`CredentialStore::upsert`].
pub type UpsertDecision<'a> =
    &'a mut dyn FnMut(Option<&Credential>) -> Result<Upsert, KycError>;

pub trait CredentialStore: Send + Sync {
    /// Atomic insert-if-absent-else-update for one subject.
    ///
    /// Returns the stored credential and what happened. `Keep` on an empty
    /// entry is a `SubjectNotFound` error.
    fn upsert(
        &self,
        subject_id: &SubjectId,
        decide: UpsertDecision<'_>,
    ) -> Result<(Credential, UpsertOutcome), KycError>;

    fn get(&self, subject_id: &SubjectId) -> Option<Credential>;

    fn find(&self, credential_id: &CredentialId) -> Option<Credential>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Inner {
    by_subject: DashMap<SubjectId, Credential>,
}

/// In-memory [`CredentialStore`] backed by `DashMap`.
///
/// Cheaply cloneable via `Arc`; all clones share the same data.
#[derive(Clone)]
pub struct InMemoryCredentialStore {
    inner: Arc<Inner>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                by_subject: DashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCredentialStore")
            .field("subjects", &self.inner.by_subject.len())
            .finish()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn upsert(
        &self,
        subject_id: &SubjectId,
        decide: UpsertDecision<'_>,
    ) -> Result<(Credential, UpsertOutcome), KycError> {
        match self.inner.by_subject.entry(subject_id.clone()) {
            Entry::Occupied(mut occupied) => match decide(Some(occupied.get()))? {
                Upsert::Keep => Ok((occupied.get().clone(), UpsertOutcome::Unchanged)),
                Upsert::Replace(credential) => {
                    occupied.insert(credential.clone());
                    Ok((credential, UpsertOutcome::Updated))
                }
                Upsert::Insert(_) => Err(KycError::Storage(format!(
                    "credential for subject {subject_id} already exists"
                ))),
            },
            Entry::Vacant(vacant) => match decide(None)? {
                Upsert::Insert(credential) => {
                    vacant.insert(credential.clone());
                    Ok((credential, UpsertOutcome::Created))
                }
                Upsert::Keep | Upsert::Replace(_) => {
                    Err(KycError::SubjectNotFound(subject_id.to_string()))
                }
            },
        }
    }

    fn get(&self, subject_id: &SubjectId) -> Option<Credential> {
        self.inner.by_subject.get(subject_id).map(|c| c.clone())
    }

    fn find(&self, credential_id: &CredentialId) -> Option<Credential> {
        self.inner
            .by_subject
            .iter()
            .find(|entry| entry.value().id == *credential_id)
            .map(|entry| entry.value().clone())
    }

    fn len(&self) -> usize {
        self.inner.by_subject.len()
    }
}
