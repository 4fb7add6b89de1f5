//! Session-scoped negative cache of codecs that failed hardware decode.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Codecs that must not be retried on hardware for the lifetime of the
/// owning service.
#[derive(Debug, Default)]
pub struct FailedCodecSet {
    codecs: Mutex<HashSet<String>>,
}

impl FailedCodecSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, codec: &str) -> bool {
        self.codecs.lock().contains(codec)
    }

    /// Mark `codec` failed. Returns `true` if it was not already marked.
    pub fn mark_failed(&self, codec: &str) -> bool {
        let added = self.codecs.lock().insert(codec.to_string());
        if added {
            tracing::warn!("Hardware decode disabled for codec {codec} for this session");
        }
        added
    }

    pub fn len(&self) -> usize {
        self.codecs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the marked codecs.
    pub fn snapshot(&self) -> Vec<String> {
        let mut codecs: Vec<String> = self.codecs.lock().iter().cloned().collect();
        codecs.sort();
        codecs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent() {
        let set = FailedCodecSet::new();
        assert!(set.is_empty());
        assert!(set.mark_failed("hevc"));
        assert!(!set.mark_failed("hevc"));
        assert!(set.contains("hevc"));
        assert!(!set.contains("h264"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted() {
        let set = FailedCodecSet::new();
        set.mark_failed("vp9");
        set.mark_failed("av1");
        assert_eq!(set.snapshot(), vec!["av1", "vp9"]);
    }
}
