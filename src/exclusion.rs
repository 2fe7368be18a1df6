//! Node-local exclusion of volumes from further expansion attempts.
//!
//! When the driver answers node-expand with a failed precondition, the
//! coordinator parks the volume here for the remainder of its mount
//! lifecycle, so repeated mount and retry cycles stop short of the driver.
//! One instance is owned by the embedding host and injected into every
//! consumer. Writer rule per key: the coordinator alone inserts entries, the
//! host alone lifts them when the mount goes away.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::claim::VolumeId;

/// Volumes blocked from further node-expansion attempts on this node.
#[derive(Debug, Default)]
pub struct ExclusionMap {
    /// Blocked volumes and why each was blocked.
    inner: Mutex<HashMap<VolumeId, String>>,
}

impl ExclusionMap {
    /// Creates an empty map.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `volume` excluded, recording why. Re-marking an excluded volume
    /// replaces the recorded reason.
    pub fn exclude<R>(&self, volume: &VolumeId, reason: R)
    where
        R: Into<String>,
    {
        self.inner.lock().insert(volume.clone(), reason.into());
    }

    /// Whether `volume` is currently excluded.
    #[must_use]
    pub fn is_excluded(&self, volume: &VolumeId) -> bool {
        self.inner.lock().contains_key(volume)
    }

    /// Why `volume` is excluded, if it is.
    #[must_use]
    pub fn reason(&self, volume: &VolumeId) -> Option<String> {
        self.inner.lock().get(volume).cloned()
    }

    /// Clears the entry for `volume`, returning whether one existed. Called
    /// by the host when the volume's mount lifecycle ends.
    pub fn lift(&self, volume: &VolumeId) -> bool {
        self.inner.lock().remove(volume).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::ExclusionMap;
    use crate::claim::VolumeId;

    #[test]
    fn test_exclude_and_lift() {
        let map = ExclusionMap::new();
        let volume = VolumeId::from("vol-1");
        assert!(!map.is_excluded(&volume));
        assert!(map.reason(&volume).is_none());

        map.exclude(&volume, "driver refused: filesystem busy");
        assert!(map.is_excluded(&volume));
        assert_eq!(
            map.reason(&volume).unwrap(),
            "driver refused: filesystem busy"
        );
        assert!(!map.is_excluded(&VolumeId::from("vol-2")));

        assert!(map.lift(&volume));
        assert!(!map.is_excluded(&volume));
        assert!(!map.lift(&volume));
    }
}
