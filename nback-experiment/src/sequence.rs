//! Constrained stimulus sequences.
//!
//! A generated [`Sequence`] contains exactly the requested number of
//! positions satisfying its [`MatchRule`]; every other position is drawn so
//! that it cannot match by accident.

use crate::config::TestConfiguration;
use crate::error::ConfigurationError;
use crate::evaluator;
use nback_core::{Digit, Stimulus};
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::ops::{Index, Range};
use tracing::{debug, warn};

/// Source of the random draws a sequence is built from.
///
/// Every [`Rng`] is a source; a seeded one makes generation reproducible.
pub trait RandomSource {
    /// A digit drawn uniformly from 1..=9.
    fn digit(&mut self) -> Digit;

    /// `amount` distinct indices drawn uniformly from `range`.
    fn sample_positions(&mut self, range: Range<usize>, amount: usize) -> Vec<usize>;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn digit(&mut self) -> Digit {
        Digit::from_index(self.random_range(0..Digit::COUNT))
    }

    fn sample_positions(&mut self, range: Range<usize>, amount: usize) -> Vec<usize> {
        let start = range.start;
        index::sample(self, range.len(), amount)
            .into_iter()
            .map(|i| start + i)
            .collect()
    }
}

/// What a position has to equal to count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchRule {
    /// Zero-back: equality with one fixed digit.
    Target(Digit),
    /// N-back for N >= 1: equality with the stimulus `lag` positions earlier.
    Lag(usize),
}

impl MatchRule {
    pub fn lag(&self) -> usize {
        match self {
            MatchRule::Target(_) => 0,
            MatchRule::Lag(lag) => *lag,
        }
    }

    pub fn target(&self) -> Option<Digit> {
        match self {
            MatchRule::Target(digit) => Some(*digit),
            MatchRule::Lag(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    stimuli: Vec<Stimulus>,
    rule: MatchRule,
}

impl Sequence {
    pub fn from_parts(stimuli: Vec<Stimulus>, rule: MatchRule) -> Self {
        Self { stimuli, rule }
    }

    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    pub fn rule(&self) -> MatchRule {
        self.rule
    }

    /// The zero-back target, if this is a zero-back sequence.
    pub fn target(&self) -> Option<Digit> {
        self.rule.target()
    }

    pub fn stimuli(&self) -> &[Stimulus] {
        &self.stimuli
    }

    pub fn is_match(&self, index: usize) -> bool {
        evaluator::is_match(&self.stimuli, index, self.rule)
    }

    /// Indices that satisfy the match rule, recomputed from the values.
    pub fn match_positions(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_match(i)).collect()
    }

    /// Indices the generator deliberately made into matches.
    pub fn forced_positions(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.stimuli[i].is_forced_match)
            .collect()
    }
}

impl Index<usize> for Sequence {
    type Output = Stimulus;

    fn index(&self, index: usize) -> &Stimulus {
        &self.stimuli[index]
    }
}

#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    max_redraws: usize,
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self { max_redraws: 64 }
    }
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the rejection loop used to avoid accidental matches. Once the cap
    /// is hit the next digit after the forbidden one is used.
    pub fn with_max_redraws(max_redraws: usize) -> Self {
        Self { max_redraws }
    }

    pub fn generate<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        config: &TestConfiguration,
    ) -> Result<Sequence, ConfigurationError> {
        config.validate()?;

        let sequence = if config.level.is_zero_back() {
            self.generate_zero_back(rng, config)
        } else {
            self.generate_lagged(rng, config)
        };

        debug!(
            level = %config.level,
            length = sequence.len(),
            forced = ?sequence.forced_positions(),
            "sequence generated"
        );
        Ok(sequence)
    }

    fn generate_zero_back<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        config: &TestConfiguration,
    ) -> Sequence {
        let len = config.sequence_length;
        let target = rng.digit();

        let mut forced = vec![false; len];
        for pos in rng.sample_positions(0..len, config.forced_match_count) {
            forced[pos] = true;
        }

        let stimuli = forced
            .into_iter()
            .map(|is_forced| {
                if is_forced {
                    Stimulus::new(target, true)
                } else {
                    Stimulus::new(self.draw_excluding(rng, target), false)
                }
            })
            .collect();

        Sequence::from_parts(stimuli, MatchRule::Target(target))
    }

    fn generate_lagged<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        config: &TestConfiguration,
    ) -> Sequence {
        let len = config.sequence_length;
        let lag = config.lag();

        let mut stimuli: Vec<Stimulus> = Vec::with_capacity(len);
        for _ in 0..lag.min(len) {
            stimuli.push(Stimulus::new(rng.digit(), false));
        }

        let mut forced = vec![false; len];
        if lag < len {
            for pos in rng.sample_positions(lag..len, config.forced_match_count) {
                forced[pos] = true;
            }
        }

        for i in lag..len {
            let earlier = stimuli[i - lag].value;
            let stimulus = if forced[i] {
                Stimulus::new(earlier, true)
            } else {
                Stimulus::new(self.draw_excluding(rng, earlier), false)
            };
            stimuli.push(stimulus);
        }

        Sequence::from_parts(stimuli, MatchRule::Lag(lag))
    }

    fn draw_excluding<R: RandomSource + ?Sized>(&self, rng: &mut R, forbidden: Digit) -> Digit {
        for _ in 0..self.max_redraws {
            let digit = rng.digit();
            if digit != forbidden {
                return digit;
            }
        }
        let fallback = forbidden.successor();
        warn!(
            %forbidden,
            %fallback,
            redraws = self.max_redraws,
            "redraw limit reached, using fallback digit"
        );
        fallback
    }
}
