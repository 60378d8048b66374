use crate::sequence::MatchRule;
use nback_core::Stimulus;

/// Whether the stimulus at `index` satisfies `rule`.
///
/// Positions with no stimulus `lag` steps back never match, nor do indices
/// past the end of the sequence.
pub fn is_match(stimuli: &[Stimulus], index: usize, rule: MatchRule) -> bool {
    let Some(current) = stimuli.get(index) else {
        return false;
    };
    match rule {
        MatchRule::Target(target) => current.value == target,
        MatchRule::Lag(lag) => index
            .checked_sub(lag)
            .is_some_and(|earlier| stimuli[earlier].value == current.value),
    }
}

/// Correctness of a press made while `index` is shown: pressing is correct
/// exactly when the stimulus is a match.
pub fn classify(stimuli: &[Stimulus], index: usize, rule: MatchRule) -> bool {
    is_match(stimuli, index, rule)
}
