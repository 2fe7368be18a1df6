//! The claim store seam.
//!
//! A claim store hands out claim records together with a version token and
//! applies writes only when the caller still holds the latest token. The
//! persistence transport behind the trait is the embedding host's concern;
//! [`memory::MemoryClaimStore`] is the in-process reference used by tests and
//! local setups.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::claim::{ClaimId, VolumeClaim};

/// Version token for optimistic concurrency on a claim record.
pub type ClaimVersion = u64;

/// The result of a claim store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// An error returned by a claim store.
///
/// The set is closed: callers decide retry behavior by variant, never by
/// message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the claim.
    #[error("claim {claim_id} not found")]
    NotFound {
        /// The claim identity looked up.
        claim_id: String,
    },
    /// The caller's version token is stale; re-read before writing again.
    #[error("stale version for claim {claim_id}")]
    Conflict {
        /// The claim identity written.
        claim_id: String,
    },
    /// The store hiccuped; the same call may succeed if repeated.
    #[error("transient store failure: {message}")]
    Transient {
        /// What went wrong.
        message: String,
    },
    /// The store rejected the operation permanently.
    #[error("fatal store failure: {message}")]
    Fatal {
        /// What went wrong.
        message: String,
    },
}

/// A claim record together with the version token it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedClaim {
    /// The claim record.
    pub claim: VolumeClaim,
    /// Version token to present on the next conditional write.
    pub version: ClaimVersion,
}

/// Versioned access to persisted claim records.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Reads the claim record and the version token it currently carries.
    async fn get(&self, claim_id: &ClaimId) -> StoreResult<VersionedClaim>;

    /// Replaces the claim record with `claim`, but only if the stored record
    /// still carries `version`. Returns the new version token on success and
    /// [`StoreError::Conflict`] when another writer got there first.
    async fn conditional_update(
        &self,
        claim_id: &ClaimId,
        version: ClaimVersion,
        claim: VolumeClaim,
    ) -> StoreResult<ClaimVersion>;
}
