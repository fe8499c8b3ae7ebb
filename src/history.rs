//! Result history: most-recent-first list of recognition results.

use std::collections::VecDeque;

use crate::recognition::RecognitionResult;

/// Append-only, most-recent-first store of recognition results.
///
/// Growth is unbounded and entries are never deduplicated; readers render the
/// full list or a bounded prefix.
#[derive(Debug, Default)]
pub struct ResultHistory {
    entries: VecDeque<RecognitionResult>,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head. Prior entries keep their order.
    pub fn append(&mut self, result: RecognitionResult) {
        self.entries.push_front(result);
    }

    /// All results, newest first.
    pub fn all(&self) -> impl Iterator<Item = &RecognitionResult> {
        self.entries.iter()
    }

    /// The newest `n` results.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &RecognitionResult> {
        self.entries.iter().take(n)
    }

    pub fn head(&self) -> Option<&RecognitionResult> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::recognition::Dialect;

    fn result(transcript: &str) -> RecognitionResult {
        RecognitionResult {
            dialect: Dialect::Mandarin,
            confidence: 0.8,
            transcript: transcript.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn append_puts_newest_at_the_head() {
        let mut history = ResultHistory::new();
        history.append(result("first"));
        history.append(result("second"));

        assert_eq!(history.head().unwrap().transcript, "second");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn prior_entries_keep_their_order() {
        let mut history = ResultHistory::new();
        for transcript in ["a", "b", "c"] {
            history.append(result(transcript));
        }
        history.append(result("d"));

        let transcripts: Vec<&str> = history.all().map(|r| r.transcript.as_str()).collect();
        assert_eq!(transcripts, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn recent_is_a_bounded_prefix() {
        let mut history = ResultHistory::new();
        for transcript in ["a", "b", "c"] {
            history.append(result(transcript));
        }

        let recent: Vec<&str> = history.recent(2).map(|r| r.transcript.as_str()).collect();
        assert_eq!(recent, vec!["c", "b"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut history = ResultHistory::new();
        history.append(result("same"));
        history.append(result("same"));
        assert_eq!(history.len(), 2);
    }
}
