//! In-memory claim store for tests and local single-node setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clippy_utilities::OverflowArithmetic;
use parking_lot::Mutex;

use super::{ClaimStore, ClaimVersion, StoreError, StoreResult, VersionedClaim};
use crate::claim::{ClaimId, VolumeClaim};

/// A claim store kept entirely in memory.
///
/// Versions start at 1 and advance by one on every applied write, so a stale
/// token is always detectable. Faults can be queued per conditional-update
/// call to exercise the callers' failure paths.
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    /// Claim records with their current version.
    inner: Mutex<HashMap<ClaimId, VersionedClaim>>,
    /// Errors queued by zero-based conditional-update call index.
    injected_update_errors: Mutex<HashMap<usize, StoreError>>,
    /// Count of conditional updates attempted so far.
    update_calls: AtomicUsize,
    /// The latency of all operations.
    latency: Duration,
}

impl MemoryClaimStore {
    /// Creates an empty store with no simulated latency.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose operations all take `latency`.
    #[must_use]
    #[inline]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// If `self.latency` is not zero, sleep for the time of it.
    async fn sleep(&self) {
        if self.latency.as_millis() != 0 {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Seeds or replaces a claim record out of band, returning the version it
    /// is stored at. Replacing advances the version, the way a control-plane
    /// writer would.
    pub fn insert(&self, claim: VolumeClaim) -> ClaimVersion {
        let mut inner = self.inner.lock();
        let version = inner
            .get(&claim.id)
            .map_or(1_u64, |stored| stored.version.overflow_add(1));
        inner.insert(claim.id.clone(), VersionedClaim { claim, version });
        version
    }

    /// Latest stored record for a claim, if any.
    #[must_use]
    pub fn latest(&self, claim_id: &ClaimId) -> Option<VersionedClaim> {
        self.inner.lock().get(claim_id).cloned()
    }

    /// Number of conditional updates attempted so far, applied or not.
    #[must_use]
    pub fn update_attempts(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Queues `error` to be returned by the zero-based `index`-th conditional
    /// update over this store's lifetime, instead of applying the write.
    pub fn inject_update_error(&self, index: usize, error: StoreError) {
        self.injected_update_errors.lock().insert(index, error);
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn get(&self, claim_id: &ClaimId) -> StoreResult<VersionedClaim> {
        self.sleep().await;
        self.inner
            .lock()
            .get(claim_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                claim_id: claim_id.to_string(),
            })
    }

    async fn conditional_update(
        &self,
        claim_id: &ClaimId,
        version: ClaimVersion,
        claim: VolumeClaim,
    ) -> StoreResult<ClaimVersion> {
        self.sleep().await;
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.injected_update_errors.lock().remove(&call) {
            return Err(error);
        }

        debug_assert!(
            claim.id == *claim_id,
            "claim record carries a different identity than the update key"
        );

        let mut inner = self.inner.lock();
        match inner.get_mut(claim_id) {
            None => Err(StoreError::NotFound {
                claim_id: claim_id.to_string(),
            }),
            Some(stored) => {
                if stored.version != version {
                    return Err(StoreError::Conflict {
                        claim_id: claim_id.to_string(),
                    });
                }
                stored.version = stored.version.overflow_add(1);
                stored.claim = claim;
                Ok(stored.version)
            }
        }
    }
}
