/// States of the trial controller.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    SelectingLevel,
    AwaitingStart,
    Presenting,
    Blank,
    Finished,
}

impl ControllerState {
    /// Whether input is polled while in this state. Blank never polls, so a
    /// cancel pressed then is only seen when the next stimulus opens.
    pub fn allows_input(&self) -> bool {
        !matches!(self, Self::Blank | Self::Finished)
    }

    pub fn can_transition_to(&self, next: ControllerState) -> bool {
        use ControllerState::*;
        match (self, next) {
            (Finished, _) => false,
            (_, Finished) => true,
            (SelectingLevel, AwaitingStart) => true,
            (AwaitingStart, Presenting) => true,
            (Presenting, Blank) => true,
            (Blank, Presenting) => true,
            _ => false,
        }
    }
}
