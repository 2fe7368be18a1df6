//! The expansion coordinator.
//!
//! Given a claim whose requested capacity outgrew its usable capacity, the
//! coordinator decides whether node-local expansion may proceed, drives the
//! driver's node-expand call, classifies the result and transitions the
//! claim's persisted resize status. One coordinator serves one node agent.
//!
//! Scheduling is owned by the embedding operation executor: it guarantees at
//! most one running attempt per (claim, node) pair and reschedules attempts
//! from the returned [`Outcome`]. Sibling node agents may race this one on
//! the same claim record (multi-attach volumes); every persisted write is
//! version-guarded, and a lost race means re-read and re-decide, never a
//! blind rewrite of stale state.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use clippy_utilities::OverflowArithmetic;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::claim::{Capacity, ClaimId, NodeId, ResizeStatus, Volume, VolumeClaim, VolumeId};
use crate::common::error::{Context, ErrorClass, ExpandError, ExpandResult};
use crate::config::InnerConfig;
use crate::driver::{DriverAdapter, DriverError, DriverParams, DriverResult};
use crate::events::{
    EventRecorder, EventSeverity, ObjectRef, REASON_EXPANSION_FAILED, REASON_EXPANSION_SUCCEEDED,
};
use crate::exclusion::ExclusionMap;
use crate::store::{ClaimStore, StoreError, StoreResult, VersionedClaim};

/// Precondition decision for one expansion attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The claim records an armed or started expansion; the attempt may run.
    Allow,
    /// Another writer already completed this expansion. The attempt still
    /// finishes successfully, without a driver call, so dependents such as
    /// mount are not blocked.
    AlreadySatisfied,
    /// The attempt is closed without retry: either nothing records that the
    /// control-plane phase ever armed this expansion, or a previous attempt
    /// was marked failed. The no-marker case is a compatibility boundary for
    /// control planes that never write the marker; kept as-is pending product
    /// review.
    Deny,
}

/// One node-expansion work order, built fresh per attempt by the operation
/// executor. Immutable; nothing in it is persisted.
#[derive(Clone, Debug)]
pub struct ExpansionRequest {
    /// Node the attempt runs on.
    pub node: NodeId,
    /// Claim whose persisted status drives the attempt.
    pub claim: ClaimId,
    /// Volume to expand.
    pub volume: VolumeId,
    /// Usable capacity recorded when the attempt was scheduled.
    pub current_size: Capacity,
    /// Capacity to expand to.
    pub target_size: Capacity,
    /// Driver-specific resize parameters, passed through opaquely.
    pub driver_params: DriverParams,
}

impl ExpansionRequest {
    /// Builds a work order from the claim and volume it concerns, taking the
    /// old size from the claim's recorded usable capacity.
    #[must_use]
    #[inline]
    pub fn new(
        node: NodeId,
        claim: &VolumeClaim,
        volume: &Volume,
        target_size: Capacity,
        driver_params: DriverParams,
    ) -> Self {
        Self {
            node,
            claim: claim.id.clone(),
            volume: volume.id.clone(),
            current_size: claim.status_capacity,
            target_size,
            driver_params,
        }
    }
}

/// Result of one coordinator call, consumed by the operation executor to
/// schedule retries.
#[derive(Debug)]
pub struct Outcome {
    /// Whether this call invoked the driver.
    pub driver_invoked: bool,
    /// Whether the driver side of the attempt is settled. When set together
    /// with a transient error, only the bookkeeping write may be retried
    /// (through [`ExpansionCoordinator::finish_bookkeeping`]), never the
    /// driver call.
    pub assume_finished: bool,
    /// Classified failure, when the attempt did not fully succeed. Only the
    /// retryable (`Transient`) and closed (`Terminal`) classes surface here;
    /// conflicts and precondition refusals are resolved in place.
    pub error: Option<ExpandError>,
}

impl Outcome {
    /// The attempt finished successfully.
    const fn success(driver_invoked: bool) -> Self {
        Self {
            driver_invoked,
            assume_finished: true,
            error: None,
        }
    }

    /// Failure before any driver call; the whole attempt is safe to retry.
    const fn fail_before_driver(error: ExpandError) -> Self {
        Self {
            driver_invoked: false,
            assume_finished: false,
            error: Some(error),
        }
    }

    /// The driver failed inconclusively; the whole attempt is retried.
    const fn retry_after_driver(error: ExpandError) -> Self {
        Self {
            driver_invoked: true,
            assume_finished: false,
            error: Some(error),
        }
    }

    /// The driver side is settled but the attempt still failed.
    const fn settled_failure(driver_invoked: bool, error: ExpandError) -> Self {
        Self {
            driver_invoked,
            assume_finished: true,
            error: Some(error),
        }
    }

    /// Whether the attempt fully succeeded.
    #[must_use]
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// What the in-progress persist loop concluded.
enum PersistOutcome {
    /// The in-progress marker is persisted (or already was); run the driver
    /// against this claim state.
    Proceed(VersionedClaim),
    /// A sibling writer finished the expansion meanwhile.
    Finished,
    /// A re-read showed the attempt may no longer run.
    Closed,
}

/// Drives node-local volume expansion against the persisted claim record.
pub struct ExpansionCoordinator {
    /// Node this coordinator serves.
    node: NodeId,
    /// Resource name tracked in the claim's resize-status map.
    resource: String,
    /// Conditional-write attempts per persisted transition before giving up.
    conflict_retries: usize,
    /// Bound on one driver node-expand call.
    driver_timeout: Duration,
    /// Claim record access.
    store: Arc<dyn ClaimStore>,
    /// Storage driver entry point.
    driver: Arc<dyn DriverAdapter>,
    /// Operator-visible notices.
    events: Arc<dyn EventRecorder>,
    /// Volumes blocked from further attempts this mount lifecycle.
    exclusions: Arc<ExclusionMap>,
}

impl fmt::Debug for ExpansionCoordinator {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionCoordinator")
            .field("node", &self.node)
            .field("resource", &self.resource)
            .field("conflict_retries", &self.conflict_retries)
            .field("driver_timeout", &self.driver_timeout)
            .finish()
    }
}

impl ExpansionCoordinator {
    /// Wires a coordinator from the validated config and its collaborators.
    #[must_use]
    #[inline]
    pub fn new(
        config: &InnerConfig,
        store: Arc<dyn ClaimStore>,
        driver: Arc<dyn DriverAdapter>,
        events: Arc<dyn EventRecorder>,
        exclusions: Arc<ExclusionMap>,
    ) -> Self {
        Self {
            node: config.node_name.clone(),
            resource: config.resize_resource.clone(),
            conflict_retries: config.conflict_retries,
            driver_timeout: config.driver_timeout,
            store,
            driver,
            events,
            exclusions,
        }
    }

    /// Decides from the persisted record alone whether a node-local expansion
    /// attempt for `claim` at `requested_size` may proceed.
    #[must_use]
    pub fn evaluate(&self, claim: &VolumeClaim, requested_size: Capacity) -> Decision {
        match claim.resize_status_of(&self.resource) {
            ResizeStatus::Pending | ResizeStatus::InProgress => Decision::Allow,
            ResizeStatus::None => {
                if claim.status_capacity >= requested_size {
                    Decision::AlreadySatisfied
                } else {
                    Decision::Deny
                }
            }
            ResizeStatus::Failed => Decision::Deny,
        }
    }

    /// Runs one expansion attempt end to end and reports how it went.
    ///
    /// Never aborts the process; every failure comes back classified inside
    /// the returned [`Outcome`]. The driver is called at most once.
    pub async fn execute(&self, request: &ExpansionRequest, token: &CancellationToken) -> Outcome {
        if let Err(error) = self.validate_request(request) {
            warn!(
                "rejecting malformed expansion request for claim {}: {error}",
                request.claim
            );
            return Outcome::fail_before_driver(error);
        }
        if token.is_cancelled() {
            debug!(
                "expansion attempt for claim {} cancelled before start",
                request.claim
            );
            return Outcome::fail_before_driver(cancelled_error(&request.claim));
        }
        if self.exclusions.is_excluded(&request.volume) {
            debug!(
                "volume {} is excluded from expansion on node {}, closing the attempt",
                request.volume, self.node
            );
            return Outcome::success(false);
        }

        // The scheduled sizes may be stale by now; the stored record decides.
        let read = match store_call(token, &request.claim, self.store.get(&request.claim)).await {
            Ok(read) => read,
            Err(error) => return Outcome::fail_before_driver(error),
        };

        match self.evaluate(&read.claim, request.target_size) {
            Decision::Allow => {}
            Decision::AlreadySatisfied => {
                debug!(
                    "claim {} already records {} usable, no expansion needed on node {}",
                    request.claim, read.claim.status_capacity, self.node
                );
                self.record_success(request, false);
                return Outcome::success(false);
            }
            Decision::Deny => {
                warn!(
                    "no armed expansion recorded for claim {}, closing the attempt without retry",
                    request.claim
                );
                return Outcome::success(false);
            }
        }

        let state = match self.persist_in_progress(read, request, token).await {
            Ok(PersistOutcome::Proceed(state)) => state,
            Ok(PersistOutcome::Finished) => {
                self.record_success(request, false);
                return Outcome::success(false);
            }
            Ok(PersistOutcome::Closed) => {
                warn!(
                    "claim {} no longer accepts expansion, closing the attempt without retry",
                    request.claim
                );
                return Outcome::success(false);
            }
            Err(error) => return Outcome::fail_before_driver(error),
        };

        if token.is_cancelled() {
            debug!(
                "expansion attempt for claim {} cancelled before the driver call; \
                 the in-progress marker stays for the next attempt",
                request.claim
            );
            return Outcome::fail_before_driver(cancelled_error(&request.claim));
        }

        let actual = match self.call_driver(request, token).await {
            Ok(actual) => actual,
            Err(error) => return self.handle_driver_failure(state, request, error, token).await,
        };
        info!(
            "driver {} expanded volume {} from {} to {actual} (target {}) on node {}",
            self.driver.driver_name(),
            request.volume,
            request.current_size,
            request.target_size,
            self.node
        );

        match self.persist_finished(state, request, token).await {
            Ok(()) => {
                self.record_success(request, true);
                Outcome::success(true)
            }
            Err(error) => {
                warn!(
                    "volume {} is expanded but recording completion for claim {} failed \
                     with a {} error, only the bookkeeping write will be retried: {error}",
                    request.volume,
                    request.claim,
                    error.classify().as_str()
                );
                Outcome::settled_failure(true, error)
            }
        }
    }

    /// Retries only the finishing write of an attempt whose driver call
    /// already succeeded, then emits the success notice.
    ///
    /// The operation executor calls this instead of [`Self::execute`] after
    /// an outcome with `driver_invoked`, `assume_finished` and a transient
    /// error, so the driver is never re-invoked for that attempt.
    pub async fn finish_bookkeeping(
        &self,
        request: &ExpansionRequest,
        token: &CancellationToken,
    ) -> Outcome {
        if token.is_cancelled() {
            return Outcome::settled_failure(false, cancelled_error(&request.claim));
        }
        let read = match store_call(token, &request.claim, self.store.get(&request.claim)).await {
            Ok(read) => read,
            Err(error) => return Outcome::settled_failure(false, error),
        };
        match self.persist_finished(read, request, token).await {
            Ok(()) => {
                self.record_success(request, true);
                Outcome::success(false)
            }
            Err(error) => Outcome::settled_failure(false, error),
        }
    }

    /// Rejects structurally invalid work orders before any state is touched.
    fn validate_request(&self, request: &ExpansionRequest) -> ExpandResult<()> {
        if request.claim.0.is_empty() {
            return Err(ExpandError::ArgumentInvalid {
                context: vec!["claim ID missing in request".to_owned()],
            });
        }
        if request.volume.0.is_empty() {
            return Err(ExpandError::ArgumentInvalid {
                context: vec!["volume ID missing in request".to_owned()],
            });
        }
        if request.target_size.is_zero() {
            return Err(ExpandError::ArgumentInvalid {
                context: vec!["target size missing in request".to_owned()],
            });
        }
        if request.node != self.node {
            return Err(ExpandError::ArgumentInvalid {
                context: vec![format!(
                    "request for node {} reached the coordinator on node {}",
                    request.node, self.node
                )],
            });
        }
        Ok(())
    }

    /// Persists the in-progress marker, re-reading and re-deciding on every
    /// lost write race up to the conflict-retry budget.
    async fn persist_in_progress(
        &self,
        read: VersionedClaim,
        request: &ExpansionRequest,
        token: &CancellationToken,
    ) -> ExpandResult<PersistOutcome> {
        let mut current = read;
        let mut attempt = 0_usize;
        loop {
            if current.claim.resize_status_of(&self.resource) == ResizeStatus::InProgress {
                // Recovery on this node, or a sibling's marker. Either way
                // the persisted state is already what this write would make.
                debug!(
                    "claim {} is already marked in-progress, skipping the write",
                    request.claim
                );
                return Ok(PersistOutcome::Proceed(current));
            }

            let mut updated = current.claim.clone();
            updated.set_resize_status(&self.resource, ResizeStatus::InProgress);
            let write = self
                .store
                .conditional_update(&request.claim, current.version, updated.clone());
            match store_call(token, &request.claim, write).await {
                Ok(version) => {
                    debug!(
                        "claim {} marked in-progress at version {version}",
                        request.claim
                    );
                    return Ok(PersistOutcome::Proceed(VersionedClaim {
                        claim: updated,
                        version,
                    }));
                }
                Err(error) => match error.classify() {
                    ErrorClass::Conflict => {
                        attempt = attempt.overflow_add(1);
                        if attempt > self.conflict_retries {
                            // Conflicts are resolved here by re-reading; once
                            // the budget is spent, what surfaces to the
                            // scheduler is a plainly retryable failure.
                            return Err(ExpandError::from(StoreError::Transient {
                                message: format!(
                                    "gave up marking claim {} in-progress after {attempt} \
                                     conflicting writes",
                                    request.claim
                                ),
                            }));
                        }
                        current =
                            store_call(token, &request.claim, self.store.get(&request.claim))
                                .await?;
                        match self.evaluate(&current.claim, request.target_size) {
                            Decision::Allow => {}
                            Decision::AlreadySatisfied => return Ok(PersistOutcome::Finished),
                            Decision::Deny => return Ok(PersistOutcome::Closed),
                        }
                    }
                    ErrorClass::Transient
                    | ErrorClass::PreconditionBlocked
                    | ErrorClass::Terminal => return Err(error),
                },
            }
        }
    }

    /// Invokes node-expand once, bounded by the configured timeout.
    async fn call_driver(
        &self,
        request: &ExpansionRequest,
        token: &CancellationToken,
    ) -> DriverResult<Capacity> {
        let call = self.driver.node_expand(
            &request.volume,
            request.target_size,
            &request.driver_params,
            token,
        );
        match tokio::time::timeout(self.driver_timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(DriverError::Transient {
                message: format!(
                    "node-expand of volume {} timed out after {:?}",
                    request.volume, self.driver_timeout
                ),
            }),
        }
    }

    /// Applies the driver-failure classification: terminal failures are
    /// persisted and surfaced, precondition refusals exclude the volume
    /// without failing the attempt, anything else is retried upstream.
    async fn handle_driver_failure(
        &self,
        state: VersionedClaim,
        request: &ExpansionRequest,
        error: DriverError,
        token: &CancellationToken,
    ) -> Outcome {
        match error {
            DriverError::Terminal { .. } => {
                warn!(
                    "driver {} reports terminal expansion failure for volume {}: {error}",
                    self.driver.driver_name(),
                    request.volume
                );
                if let Err(persist_error) = self.persist_failed(state, request, token).await {
                    warn!(
                        "failed to record the failed expansion on claim {}: {persist_error}",
                        request.claim
                    );
                }
                self.events.record(
                    &ObjectRef::claim(&request.claim),
                    EventSeverity::Warning,
                    REASON_EXPANSION_FAILED,
                    &format!(
                        "node-expand of volume {} to {} failed permanently on node {}: {error}",
                        request.volume, request.target_size, self.node
                    ),
                );
                Outcome::settled_failure(true, ExpandError::from(error))
            }
            DriverError::PreconditionBlocked { .. } => {
                info!(
                    "driver {} blocked expansion of volume {} on a precondition, \
                     excluding it on node {} for this mount lifecycle: {error}",
                    self.driver.driver_name(),
                    request.volume,
                    self.node
                );
                self.exclusions.exclude(&request.volume, error.to_string());
                Outcome::success(true)
            }
            DriverError::Transient { .. } => {
                debug!(
                    "transient driver failure for volume {}, the scheduler may retry: {error}",
                    request.volume
                );
                Outcome::retry_after_driver(ExpandError::from(error))
            }
        }
    }

    /// Records the driver's terminal verdict on the claim. Skipped when a
    /// re-read shows the claim moved past this attempt.
    async fn persist_failed(
        &self,
        state: VersionedClaim,
        request: &ExpansionRequest,
        token: &CancellationToken,
    ) -> ExpandResult<()> {
        let mut current = state;
        let mut attempt = 0_usize;
        loop {
            match self.evaluate(&current.claim, request.target_size) {
                Decision::Allow => {}
                Decision::AlreadySatisfied | Decision::Deny => {
                    debug!(
                        "claim {} moved on before the failed marker was written",
                        request.claim
                    );
                    return Ok(());
                }
            }
            let mut updated = current.claim.clone();
            updated.set_resize_status(&self.resource, ResizeStatus::Failed);
            let write = self
                .store
                .conditional_update(&request.claim, current.version, updated);
            match store_call(token, &request.claim, write).await {
                Ok(version) => {
                    debug!(
                        "claim {} marked {} at version {version}",
                        request.claim,
                        ResizeStatus::Failed
                    );
                    return Ok(());
                }
                Err(error) => match error.classify() {
                    ErrorClass::Conflict => {
                        attempt = attempt.overflow_add(1);
                        if attempt > self.conflict_retries {
                            return Err(ExpandError::from(StoreError::Transient {
                                message: format!(
                                    "gave up marking claim {} failed after {attempt} \
                                     conflicting writes",
                                    request.claim
                                ),
                            }));
                        }
                        current =
                            store_call(token, &request.claim, self.store.get(&request.claim))
                                .await?;
                    }
                    ErrorClass::Transient
                    | ErrorClass::PreconditionBlocked
                    | ErrorClass::Terminal => return Err(error),
                },
            }
        }
    }

    /// The one conditional write that raises the usable capacity and clears
    /// the resize status, with the no-regression guard ahead of every try.
    async fn persist_finished(
        &self,
        state: VersionedClaim,
        request: &ExpansionRequest,
        token: &CancellationToken,
    ) -> ExpandResult<()> {
        let mut current = state;
        let mut attempt = 0_usize;
        loop {
            match self.evaluate(&current.claim, request.target_size) {
                Decision::Allow => {
                    if current.claim.resize_status_of(&self.resource) == ResizeStatus::Pending
                        && current.claim.status_capacity >= request.target_size
                    {
                        // The capacity is recorded already; a pending marker
                        // on top of it belongs to a newer, larger expansion
                        // and must stay armed for it.
                        debug!(
                            "claim {} already records {} usable, leaving the newer \
                             pending marker in place",
                            request.claim, current.claim.status_capacity
                        );
                        return Ok(());
                    }
                }
                Decision::AlreadySatisfied | Decision::Deny => {
                    // A sibling's finishing write got there first, or the
                    // claim moved past this attempt.
                    debug!(
                        "claim {} no longer needs this finishing write",
                        request.claim
                    );
                    return Ok(());
                }
            }
            let mut updated = current.claim.clone();
            if !updated.finish_expansion(&self.resource, request.target_size) {
                // A sibling already recorded a larger finish; ours must not
                // regress it.
                debug!(
                    "claim {} already records {} usable, beyond the target {}",
                    request.claim, current.claim.status_capacity, request.target_size
                );
                return Ok(());
            }
            let write = self
                .store
                .conditional_update(&request.claim, current.version, updated);
            match store_call(token, &request.claim, write).await {
                Ok(version) => {
                    info!(
                        "claim {} records {} usable at version {version}",
                        request.claim, request.target_size
                    );
                    return Ok(());
                }
                Err(error) => match error.classify() {
                    ErrorClass::Conflict => {
                        attempt = attempt.overflow_add(1);
                        if attempt > self.conflict_retries {
                            // Surfacing a transient failure here keeps the
                            // scheduler on the bookkeeping-only retry path.
                            return Err(ExpandError::from(StoreError::Transient {
                                message: format!(
                                    "gave up recording the finished expansion for claim {} \
                                     after {attempt} conflicting writes",
                                    request.claim
                                ),
                            }));
                        }
                        current =
                            store_call(token, &request.claim, self.store.get(&request.claim))
                                .await?;
                    }
                    ErrorClass::Transient
                    | ErrorClass::PreconditionBlocked
                    | ErrorClass::Terminal => return Err(error),
                },
            }
        }
    }

    /// Emits the operator-visible success notice (fire-and-forget).
    fn record_success(&self, request: &ExpansionRequest, driver_invoked: bool) {
        let message = if driver_invoked {
            format!(
                "volume {} expanded to {} on node {} by driver {}",
                request.volume,
                request.target_size,
                self.node,
                self.driver.driver_name()
            )
        } else {
            format!(
                "volume {} already provides {} for claim {}, nothing to expand on node {}",
                request.volume, request.target_size, request.claim, self.node
            )
        };
        self.events.record(
            &ObjectRef::claim(&request.claim),
            EventSeverity::Normal,
            REASON_EXPANSION_SUCCEEDED,
            &message,
        );
    }
}

/// Error for an attempt cancelled by the caller's context.
fn cancelled_error(claim_id: &ClaimId) -> ExpandError {
    ExpandError::Cancelled {
        context: vec![format!("expansion attempt for claim {claim_id} cancelled")],
    }
}

/// Races a claim store future against the caller's cancellation context.
async fn store_call<T, F>(token: &CancellationToken, claim_id: &ClaimId, fut: F) -> ExpandResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        () = token.cancelled() => Err(cancelled_error(claim_id)),
        result = fut => {
            result.with_context(|| format!("claim store operation failed for claim {claim_id}"))
        }
    }
}
