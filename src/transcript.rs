use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One received transcript line with its audit annotation. `text` is the
/// raw line as delivered by the recognizer, not the normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub text: String,
    pub is_risk: bool,
    pub hit_word: Option<String>,
    pub timestamp: u64,
}

/// Bounded, newest-first log of transcript lines kept for operator review.
///
/// Recognizers re-deliver the same interim line many times while speech is
/// still being decoded; an update whose text equals the newest entry is
/// skipped unless it carries a risk hit, so the log holds distinct lines
/// plus every flagged one.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
}

impl TranscriptLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records an entry at the front, evicting the oldest beyond capacity.
    /// Returns false when the entry was suppressed as an interim duplicate.
    pub fn push(&mut self, entry: TranscriptEntry) -> bool {
        if let Some(newest) = self.entries.front() {
            if newest.text == entry.text && !entry.is_risk {
                return false;
            }
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        true
    }

    pub fn newest(&self) -> Option<&TranscriptEntry> {
        self.entries.front()
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, is_risk: bool) -> TranscriptEntry {
        TranscriptEntry {
            text: text.to_string(),
            is_risk,
            hit_word: is_risk.then(|| "私域".to_string()),
            timestamp: 0,
        }
    }

    #[test]
    fn newest_entry_sits_at_the_front() {
        let mut log = TranscriptLog::new(15);
        log.push(entry("first", false));
        log.push(entry("second", false));
        assert_eq!(log.newest().unwrap().text, "second");
        let texts: Vec<&str> = log.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut log = TranscriptLog::new(3);
        for i in 0..5 {
            log.push(entry(&format!("line {i}"), false));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.newest().unwrap().text, "line 4");
        assert!(log.iter().all(|e| e.text != "line 0" && e.text != "line 1"));
    }

    #[test]
    fn interim_duplicates_are_suppressed() {
        let mut log = TranscriptLog::new(15);
        assert!(log.push(entry("我们聊聊", false)));
        assert!(!log.push(entry("我们聊聊", false)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn duplicate_with_risk_hit_is_kept() {
        let mut log = TranscriptLog::new(15);
        log.push(entry("我们聊聊私域", false));
        assert!(log.push(entry("我们聊聊私域", true)));
        assert_eq!(log.len(), 2);
        assert!(log.newest().unwrap().is_risk);
    }

    #[test]
    fn zero_capacity_still_keeps_one() {
        let mut log = TranscriptLog::new(0);
        log.push(entry("line", false));
        assert_eq!(log.len(), 1);
    }
}
