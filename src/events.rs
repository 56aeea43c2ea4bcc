//! Append-only keyframe event log
//!
//! The sampler is the only writer; presentation collaborators read. The
//! mutex exists so multi-threaded deployments keep `append` serialized.

use std::sync::Mutex;

use crate::types::KeyframeEvent;

/// Ordered store of emitted keyframe events. No deduplication, no
/// reordering; `all()` returns arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: Mutex<Vec<KeyframeEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append one event to the end of the log.
    pub fn append(&self, event: KeyframeEvent) {
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.push(event);
    }

    /// Full event sequence in arrival order.
    pub fn all(&self) -> Vec<KeyframeEvent> {
        self.entries.lock().expect("lock poisoned").clone()
    }

    /// Empty the log. Called by the owning collaborator on call end.
    pub fn clear(&self) {
        self.entries.lock().expect("lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyframeKind;
    use bytes::Bytes;

    fn event(kind: KeyframeKind, timestamp_ms: u64) -> KeyframeEvent {
        KeyframeEvent::new(kind, timestamp_ms, Bytes::from_static(b"snapshot"))
    }

    #[test]
    fn test_append_preserves_order() {
        let log = EventLog::new();
        log.append(event(KeyframeKind::Audio, 100));
        log.append(event(KeyframeKind::Video, 3000));
        log.append(event(KeyframeKind::Audio, 3100));

        let all = log.all();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|e| e.timestamp_ms).collect::<Vec<_>>(),
            vec![100, 3000, 3100],
            "events must come back in arrival order"
        );
    }

    #[test]
    fn test_clear_empties_log() {
        let log = EventLog::new();
        log.append(event(KeyframeKind::Audio, 1));
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(log.all().is_empty());
    }

    #[test]
    fn test_new_log_is_empty() {
        let log = EventLog::new();
        assert!(log.is_empty());
    }
}
