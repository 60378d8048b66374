use crate::config::TestConfiguration;
use crate::sequence::Sequence;
use nback_core::{Digit, Level, ResponseEvent, TrialRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A press together with the stimulus that was on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedResponse {
    pub digit: Digit,
    pub observed_at_ns: u64,
}

/// Correct and incorrect presses, each in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsAggregator {
    correct: Vec<TimedResponse>,
    incorrect: Vec<TimedResponse>,
}

impl ResultsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, digit: Digit, event: ResponseEvent) {
        let timed = TimedResponse {
            digit,
            observed_at_ns: event.observed_at_ns,
        };
        if event.correct {
            self.correct.push(timed);
        } else {
            self.incorrect.push(timed);
        }
    }

    pub fn correct(&self) -> &[TimedResponse] {
        &self.correct
    }

    pub fn incorrect(&self) -> &[TimedResponse] {
        &self.incorrect
    }

    pub fn summarize(
        &self,
        configuration: &TestConfiguration,
        sequence: &Sequence,
        trials: &[TrialRecord],
    ) -> Summary {
        let presented_matches: Vec<&TrialRecord> = trials
            .iter()
            .filter(|t| sequence.is_match(t.index))
            .collect();
        let hits = presented_matches
            .iter()
            .filter(|t| t.has_correct_response())
            .count();
        let reaction_times_ns = trials.iter().filter_map(TrialRecord::first_reaction_ns).collect();

        Summary {
            level: configuration.level,
            target: sequence.target(),
            sequence_length: configuration.sequence_length,
            forced_matches: configuration.forced_match_count,
            stimuli_presented: trials.len(),
            hits,
            misses: presented_matches.len() - hits,
            false_alarms: self.incorrect.len(),
            reaction_times_ns,
            correct: self.correct.clone(),
            incorrect: self.incorrect.clone(),
        }
    }
}

/// End-of-test report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub level: Level,
    pub target: Option<Digit>,
    pub sequence_length: usize,
    pub forced_matches: usize,
    pub stimuli_presented: usize,
    /// Match stimuli that received at least one correct press.
    pub hits: usize,
    /// Presented match stimuli without a correct press.
    pub misses: usize,
    pub false_alarms: usize,
    /// Onset-to-first-press latency of every stimulus that drew a press.
    pub reaction_times_ns: Vec<u64>,
    pub correct: Vec<TimedResponse>,
    pub incorrect: Vec<TimedResponse>,
}

fn seconds(ns: u64) -> f64 {
    ns as f64 / 1e9
}

impl Summary {
    pub fn mean_reaction_ms(&self) -> Option<f64> {
        if self.reaction_times_ns.is_empty() {
            return None;
        }
        let total: u64 = self.reaction_times_ns.iter().sum();
        Some(total as f64 / self.reaction_times_ns.len() as f64 / 1e6)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} test: {}/{} stimuli presented",
            self.level, self.stimuli_presented, self.sequence_length
        )?;
        if let Some(target) = self.target {
            writeln!(f, "Target digit: '{target}'")?;
        }
        writeln!(
            f,
            "Hits: {}, misses: {}, false alarms: {}",
            self.hits, self.misses, self.false_alarms
        )?;
        if let Some(mean) = self.mean_reaction_ms() {
            writeln!(f, "Mean reaction time: {mean:.1} ms")?;
        }
        writeln!(f, "Timestamps of correct keypresses:")?;
        for r in &self.correct {
            writeln!(f, "  Correct response '{}': {:.6}", r.digit, seconds(r.observed_at_ns))?;
        }
        writeln!(f, "Timestamps of incorrect keypresses:")?;
        for r in &self.incorrect {
            writeln!(f, "  Wrong response '{}': {:.6}", r.digit, seconds(r.observed_at_ns))?;
        }
        Ok(())
    }
}
