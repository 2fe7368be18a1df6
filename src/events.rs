//! Operator-visible event recording.

use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::claim::ClaimId;

/// Reason recorded when an expansion attempt finishes successfully, by driver
/// call or because a sibling writer already completed it.
pub const REASON_EXPANSION_SUCCEEDED: &str = "VolumeExpansionSucceeded";
/// Reason recorded when the driver declares the expansion permanently failed
/// on this node.
pub const REASON_EXPANSION_FAILED: &str = "VolumeExpansionFailed";

/// Severity of a recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSeverity {
    /// Routine progress notice.
    Normal,
    /// Something an operator should look at.
    Warning,
}

impl EventSeverity {
    /// Severity name as a static string.
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

impl fmt::Display for EventSeverity {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to the object an event is recorded against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    /// Object kind, such as `VolumeClaim`.
    pub kind: String,
    /// Object name.
    pub name: String,
}

impl ObjectRef {
    /// Reference to a claim record.
    #[must_use]
    #[inline]
    pub fn claim(id: &ClaimId) -> Self {
        Self {
            kind: "VolumeClaim".to_owned(),
            name: id.to_string(),
        }
    }
}

/// Sink for operator-visible notices.
///
/// Implementations are fire-and-forget: `record` never blocks the caller and
/// delivery failures stay inside the implementation.
pub trait EventRecorder: Send + Sync {
    /// Records one event against `object`.
    fn record(&self, object: &ObjectRef, severity: EventSeverity, reason: &str, message: &str);
}

/// An event captured by [`CollectingRecorder`].
#[derive(Clone, Debug)]
pub struct RecordedEvent {
    /// Object the event was recorded against.
    pub object: ObjectRef,
    /// Event severity.
    pub severity: EventSeverity,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

/// Recorder keeping events in memory, for tests and local setups.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    /// Captured events in record order.
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectingRecorder {
    /// Creates an empty recorder.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events captured so far, in record order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Number of captured events carrying `reason`.
    #[must_use]
    pub fn reason_count(&self, reason: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.reason == reason)
            .count()
    }
}

impl EventRecorder for CollectingRecorder {
    fn record(&self, object: &ObjectRef, severity: EventSeverity, reason: &str, message: &str) {
        debug!(
            "event {severity} {reason} on {}/{}: {message}",
            object.kind, object.name
        );
        self.events.lock().push(RecordedEvent {
            object: object.clone(),
            severity,
            reason: reason.to_owned(),
            message: message.to_owned(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{
        CollectingRecorder, EventRecorder, EventSeverity, ObjectRef, REASON_EXPANSION_SUCCEEDED,
    };
    use crate::claim::ClaimId;

    #[test]
    fn test_collects_in_order() {
        let recorder = CollectingRecorder::new();
        let object = ObjectRef::claim(&ClaimId::from("claim-1"));

        recorder.record(
            &object,
            EventSeverity::Normal,
            REASON_EXPANSION_SUCCEEDED,
            "volume vol-1 expanded to 10Gi",
        );

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        let event = events.first().unwrap();
        assert_eq!(event.object, object);
        assert_eq!(event.severity, EventSeverity::Normal);
        assert_eq!(recorder.reason_count(REASON_EXPANSION_SUCCEEDED), 1);
        assert_eq!(recorder.reason_count("SomethingElse"), 0);
    }

    #[test]
    fn test_severity_rendering() {
        assert_eq!(EventSeverity::Normal.as_str(), "Normal");
        assert_eq!(EventSeverity::Warning.to_string(), "Warning");
    }
}
