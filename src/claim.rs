//! Persisted data model for volume capacity expansion.
//!
//! The claim record is owned by the claim store; a coordinator run holds a
//! transient copy and writes it back through a version-guarded update. All
//! mutation helpers here keep the record's invariants: the usable capacity
//! never regresses and a cleared resize status leaves no key behind in the
//! persisted map.

use std::collections::HashMap;
use std::fmt;

use clippy_utilities::OverflowArithmetic;
use serde::{Deserialize, Serialize};

/// Resource name under which the storage dimension of a claim is tracked in
/// the resize-status map.
pub const STORAGE_RESOURCE: &str = "storage";

/// Bytes per kibibyte.
const KIB: u64 = 1_024;
/// Bytes per mebibyte.
const MIB: u64 = 1_048_576;
/// Bytes per gibibyte.
const GIB: u64 = 1_073_741_824;

/// Byte-denominated storage capacity.
///
/// Ordered by raw byte count. Displays in binary units when the count aligns
/// to one, raw bytes otherwise.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Capacity(u64);

impl Capacity {
    /// Zero bytes.
    pub const ZERO: Self = Self(0);

    /// Builds a capacity from a raw byte count.
    #[must_use]
    #[inline]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Builds a capacity from a count of mebibytes.
    #[must_use]
    #[inline]
    pub fn from_mib(mib: u64) -> Self {
        Self(mib.overflow_mul(MIB))
    }

    /// Builds a capacity from a count of gibibytes.
    #[must_use]
    #[inline]
    pub fn from_gib(gib: u64) -> Self {
        Self(gib.overflow_mul(GIB))
    }

    /// Raw byte count.
    #[must_use]
    #[inline]
    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    /// Whether this capacity is zero bytes.
    #[must_use]
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Capacity {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes == 0 {
            write!(f, "0")
        } else if bytes.checked_rem(GIB) == Some(0) {
            write!(f, "{}Gi", bytes.overflow_div(GIB))
        } else if bytes.checked_rem(MIB) == Some(0) {
            write!(f, "{}Mi", bytes.overflow_div(MIB))
        } else if bytes.checked_rem(KIB) == Some(0) {
            write!(f, "{}Ki", bytes.overflow_div(KIB))
        } else {
            write!(f, "{bytes}")
        }
    }
}

/// Identity of a claim record in the claim store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl fmt::Display for ClaimId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClaimId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ClaimId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of a backend volume known to the storage driver.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub String);

impl fmt::Display for VolumeId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VolumeId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for VolumeId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of the node agent running the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Node-local expansion phase persisted on a claim, per named resource.
///
/// An entry absent from the claim's resize-status map reads as `None`.
/// `None` with `status_capacity` at or above the requested capacity means the
/// expansion finished; `None` with a smaller `status_capacity` means no
/// control-plane pass ever armed the expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeStatus {
    /// No expansion is recorded for the resource.
    None,
    /// The control plane armed an expansion; no node agent picked it up yet.
    Pending,
    /// A node agent persisted its intent and may have called the driver.
    InProgress,
    /// A node agent recorded a permanent failure for its attempt.
    Failed,
}

impl ResizeStatus {
    /// Status name as a static string.
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ResizeStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted claim record: desired capacity, last usable capacity and the
/// per-resource resize status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaim {
    /// Claim identity in the store.
    pub id: ClaimId,
    /// Capacity the user asked for.
    pub requested_capacity: Capacity,
    /// Last capacity known usable on a node.
    pub status_capacity: Capacity,
    /// Resize phase per named resource; an absent key reads as
    /// [`ResizeStatus::None`].
    pub resize_status: HashMap<String, ResizeStatus>,
}

impl VolumeClaim {
    /// Creates a claim record with an empty resize-status map.
    #[must_use]
    #[inline]
    pub fn new(id: ClaimId, requested_capacity: Capacity, status_capacity: Capacity) -> Self {
        Self {
            id,
            requested_capacity,
            status_capacity,
            resize_status: HashMap::new(),
        }
    }

    /// Resize status recorded for `resource`, with an absent entry reading as
    /// [`ResizeStatus::None`].
    #[must_use]
    #[inline]
    pub fn resize_status_of(&self, resource: &str) -> ResizeStatus {
        self.resize_status
            .get(resource)
            .copied()
            .unwrap_or(ResizeStatus::None)
    }

    /// Records `status` for `resource`.
    ///
    /// Recording [`ResizeStatus::None`] removes the entry so the persisted
    /// map never carries keys that read the same as their absence.
    #[inline]
    pub fn set_resize_status(&mut self, resource: &str, status: ResizeStatus) {
        if matches!(status, ResizeStatus::None) {
            self.resize_status.remove(resource);
        } else {
            self.resize_status.insert(resource.to_owned(), status);
        }
    }

    /// Finishes an expansion: raises `status_capacity` to `expanded_to` and
    /// clears the resize status for `resource` in one mutation.
    ///
    /// The usable capacity never regresses: when `expanded_to` is below the
    /// recorded capacity the claim is left untouched and `false` is returned,
    /// so a racer that lost to a larger sibling finish cannot undo it.
    #[must_use]
    #[inline]
    pub fn finish_expansion(&mut self, resource: &str, expanded_to: Capacity) -> bool {
        if expanded_to < self.status_capacity {
            return false;
        }
        self.status_capacity = expanded_to;
        self.resize_status.remove(resource);
        true
    }
}

/// Backend volume a claim is bound to.
///
/// Read-only input to the node-local phase; its capacity is maintained by the
/// control plane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume identity known to the storage driver.
    pub id: VolumeId,
    /// Backend-reported size.
    pub capacity: Capacity,
}

impl Volume {
    /// Creates a volume record.
    #[must_use]
    #[inline]
    pub fn new(id: VolumeId, capacity: Capacity) -> Self {
        Self { id, capacity }
    }
}
