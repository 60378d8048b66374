use crate::stimulus::Stimulus;
use serde::{Deserialize, Serialize};

/// A single key press observed while a stimulus was on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub correct: bool,
    pub observed_at_ns: u64,
}

/// Recorded presentation of one stimulus and every press made during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: usize,
    pub stimulus: Stimulus,
    pub presented_at_ns: u64,
    pub responses: Vec<ResponseEvent>,
}

impl TrialRecord {
    pub fn new(index: usize, stimulus: Stimulus, presented_at_ns: u64) -> Self {
        Self {
            index,
            stimulus,
            presented_at_ns,
            responses: Vec::new(),
        }
    }

    pub fn push_response(&mut self, event: ResponseEvent) {
        self.responses.push(event);
    }

    pub fn has_correct_response(&self) -> bool {
        self.responses.iter().any(|r| r.correct)
    }

    /// Reaction time of the first press, if any.
    pub fn first_reaction_ns(&self) -> Option<u64> {
        self.responses
            .first()
            .map(|r| r.observed_at_ns.saturating_sub(self.presented_at_ns))
    }
}
