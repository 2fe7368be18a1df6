//! The storage driver adapter seam.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::claim::{Capacity, VolumeId};

/// Driver-specific resize parameters, handed through opaquely from the
/// expansion request to the driver.
pub type DriverParams = HashMap<String, String>;

/// The result of a driver call.
pub type DriverResult<T> = Result<T, DriverError>;

/// An error returned by a storage driver's node-expand call.
///
/// The set is closed: an adapter maps every raw plugin failure onto exactly
/// one variant, and callers branch on the variant alone.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver declares that no further retry will help on this node.
    #[error("terminal driver failure: {message}")]
    Terminal {
        /// What went wrong.
        message: String,
    },
    /// The driver refuses to expand right now. Callers stop retrying on this
    /// node for the mount lifecycle but must not fail the consumer.
    #[error("driver precondition failed: {message}")]
    PreconditionBlocked {
        /// What went wrong.
        message: String,
    },
    /// Inconclusive failure; the call may be repeated.
    #[error("transient driver failure: {message}")]
    Transient {
        /// What went wrong.
        message: String,
    },
}

/// Node-side expansion entry point of a storage driver.
///
/// # Contract
///
/// `node_expand` MUST be safe to re-invoke after an inconclusive result
/// ([`DriverError::Transient`], which includes timeouts and cancellation):
/// a repeated call for a size the volume already has must succeed without
/// side effects. Callers re-invoke only in that case; after a conclusive
/// success the call is never repeated for the same attempt.
#[async_trait]
pub trait DriverAdapter: Send + Sync {
    /// Name of the driver, for logs and event messages.
    fn driver_name(&self) -> &str;

    /// Expands the volume's on-node filesystem to `target_size`, returning
    /// the size actually arranged, which may exceed the target.
    ///
    /// `capabilities` carries the driver-specific resize parameters from the
    /// expansion request. `token` is the caller's cancellation context; an
    /// implementation observing it fire should give up and return
    /// [`DriverError::Transient`].
    async fn node_expand(
        &self,
        volume_id: &VolumeId,
        target_size: Capacity,
        capabilities: &DriverParams,
        token: &CancellationToken,
    ) -> DriverResult<Capacity>;
}
