use crate::config::ExperimentConfig;
use crate::error::{RunError, TelemetryError};
use crate::evaluator;
use crate::sequence::{RandomSource, SequenceGenerator};
use crate::session::{Session, TestSession};
use crate::telemetry::{Annotation, OnComplete, ignore_completion};
use nback_core::{ControllerState, Digit, Level, ResponseEvent, Signal};
use nback_timing::Timer;
use std::time::Duration;
use tracing::{debug, info};

pub const SELECT_PROMPT: &str = "Press 0, 1, 2, or 3 to select an N-back level. ESC to quit.";

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Cancelled on the selection screen. Nothing was generated or logged.
    Aborted,
    /// Cancelled after the test started; holds what was recorded so far.
    Cancelled(TestSession),
    Completed(TestSession),
}

impl RunOutcome {
    pub fn session(&self) -> Option<&TestSession> {
        match self {
            RunOutcome::Aborted => None,
            RunOutcome::Cancelled(s) | RunOutcome::Completed(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancel,
}

/// Drives one N-back run from level selection to teardown on the calling
/// thread, polling input itself between deadlines.
pub struct TrialController<'s, T, R>
where
    T: Timer<Timestamp = u64>,
    R: RandomSource,
{
    state: ControllerState,
    session: Session<'s>,
    timer: T,
    rng: R,
    config: ExperimentConfig,
    generator: SequenceGenerator,
}

impl<'s, T, R> TrialController<'s, T, R>
where
    T: Timer<Timestamp = u64>,
    R: RandomSource,
{
    pub fn new(config: ExperimentConfig, session: Session<'s>, timer: T, rng: R) -> Self {
        Self {
            state: ControllerState::default(),
            session,
            timer,
            rng,
            config,
            generator: SequenceGenerator::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Runs the whole test. Once `Test.start` has been emitted, `Test.end`,
    /// the settle delay and logger shutdown happen on every exit path.
    pub fn run(mut self) -> Result<RunOutcome, RunError> {
        let level = match self.select_level() {
            Ok(Some(level)) => level,
            Ok(None) => {
                info!("cancelled during level selection");
                self.abort();
                return Ok(RunOutcome::Aborted);
            }
            Err(e) => {
                self.abort();
                return Err(e.into());
            }
        };

        let configuration = match self.config.test_configuration(level) {
            Ok(c) => c,
            Err(e) => {
                self.abort();
                return Err(e.into());
            }
        };
        let sequence = match self.generator.generate(&mut self.rng, &configuration) {
            Ok(s) => s,
            Err(e) => {
                self.abort();
                return Err(e.into());
            }
        };
        let mut test = TestSession::new(configuration, sequence);

        self.emit(
            Annotation::test_start(level.lag()),
            Box::new(|result: Result<(), TelemetryError>| {
                if result.is_ok() {
                    info!("Test.start logged");
                }
            }),
        );

        let flow = match self.await_start(&test) {
            Ok(Flow::Continue) => self.present_all(&mut test),
            other => other,
        };
        self.finish(level);

        match flow? {
            Flow::Continue => Ok(RunOutcome::Completed(test)),
            Flow::Cancel => Ok(RunOutcome::Cancelled(test)),
        }
    }

    fn select_level(&mut self) -> anyhow::Result<Option<Level>> {
        self.session
            .renderer
            .render(SELECT_PROMPT, self.config.foreground)?;
        loop {
            match self.poll(self.config.poll_interval())? {
                Some(Signal::Select(level)) => {
                    info!(%level, "level selected");
                    self.transition(ControllerState::AwaitingStart);
                    return Ok(Some(level));
                }
                Some(Signal::Cancel) => return Ok(None),
                Some(Signal::Press) | None => {}
            }
        }
    }

    fn await_start(&mut self, test: &TestSession) -> anyhow::Result<Flow> {
        let message = welcome_message(test.configuration.level, test.sequence.target());
        self.session
            .renderer
            .render(&message, self.config.foreground)?;
        loop {
            match self.poll(self.config.poll_interval())? {
                Some(Signal::Press) => return Ok(Flow::Continue),
                Some(Signal::Cancel) => return Ok(Flow::Cancel),
                Some(Signal::Select(_)) | None => {}
            }
        }
    }

    fn present_all(&mut self, test: &mut TestSession) -> anyhow::Result<Flow> {
        for index in 0..test.sequence.len() {
            self.transition(ControllerState::Presenting);
            // Presses made while input was closed belong to no window.
            if self.session.input.discard_pending()? {
                info!("cancel received during blank interval");
                return Ok(Flow::Cancel);
            }

            let digit = test.sequence[index].value;
            let matches = test.sequence.is_match(index);

            self.session
                .renderer
                .render(digit.as_str(), self.config.foreground)?;
            let presented_at = self.timer.now();
            test.begin_trial(index, presented_at);

            info!("Stimulus {index}: {digit}{}", if matches { " *" } else { "" });
            self.emit(Annotation::stimulus(digit, matches), ignore_completion());

            if self.collect_responses(test, index, presented_at)? == Flow::Cancel {
                return Ok(Flow::Cancel);
            }

            self.transition(ControllerState::Blank);
            self.session
                .renderer
                .render(&self.config.blank_symbol, self.config.foreground)?;
            if self.wait(self.config.blank_duration())? == Flow::Cancel {
                return Ok(Flow::Cancel);
            }
        }
        Ok(Flow::Continue)
    }

    /// Polls until the response window of `index` closes. Every press seen
    /// strictly inside the window is scored and annotated.
    fn collect_responses(
        &mut self,
        test: &mut TestSession,
        index: usize,
        presented_at: u64,
    ) -> anyhow::Result<Flow> {
        let window = self.config.stimulus_duration();
        let poll_interval = self.config.poll_interval();

        loop {
            let elapsed = self.timer.elapsed(presented_at);
            if elapsed >= window {
                return Ok(Flow::Continue);
            }

            match self.poll((window - elapsed).min(poll_interval))? {
                Some(Signal::Press) => {
                    let observed_at = self.timer.now();
                    if Duration::from_nanos(observed_at.saturating_sub(presented_at)) >= window {
                        debug!(index, "press arrived after the response window closed");
                        return Ok(Flow::Continue);
                    }
                    let correct = evaluator::classify(
                        test.sequence.stimuli(),
                        index,
                        test.sequence.rule(),
                    );
                    test.record_response(ResponseEvent {
                        correct,
                        observed_at_ns: observed_at,
                    });
                    self.emit(Annotation::response(correct), ignore_completion());
                    let digit = test.sequence[index].value;
                    if correct {
                        info!("  Correct response at {observed_at} ns for '{digit}'");
                    } else {
                        info!("  Wrong response at {observed_at} ns for '{digit}'");
                    }
                }
                Some(Signal::Cancel) => return Ok(Flow::Cancel),
                Some(Signal::Select(_)) | None => {}
            }
        }
    }

    /// Next signal, or `None` without touching the input source while the
    /// current state keeps input closed.
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Signal>> {
        if !self.state.allows_input() {
            return Ok(None);
        }
        self.session.input.poll(timeout)
    }

    /// Lets `duration` pass. States that accept input keep polling so a
    /// cancel ends the wait; the others block on the timer.
    fn wait(&mut self, duration: Duration) -> anyhow::Result<Flow> {
        if !self.state.allows_input() {
            self.timer.sleep(duration);
            return Ok(Flow::Continue);
        }
        let start = self.timer.now();
        loop {
            let elapsed = self.timer.elapsed(start);
            if elapsed >= duration {
                return Ok(Flow::Continue);
            }
            let timeout = (duration - elapsed).min(self.config.poll_interval());
            if self.poll(timeout)? == Some(Signal::Cancel) {
                return Ok(Flow::Cancel);
            }
        }
    }

    fn finish(&mut self, level: Level) {
        self.transition(ControllerState::Finished);
        self.emit(Annotation::test_end(level.lag()), ignore_completion());
        self.timer.sleep(self.config.settle_duration());
        self.session.logger.shutdown();
        info!("Test terminated");
    }

    /// Teardown for runs that never started: no annotations, logger released.
    fn abort(&mut self) {
        self.transition(ControllerState::Finished);
        self.session.logger.shutdown();
    }

    fn emit(&mut self, annotation: Annotation, on_complete: OnComplete) {
        self.session.logger.log_annotation(annotation, on_complete);
    }

    fn transition(&mut self, next: ControllerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

pub fn welcome_message(level: Level, target: Option<Digit>) -> String {
    match target {
        Some(target) => format!(
            "Welcome to the {}-back test.\nYour target digit is '{target}'.\nPress SPACE to start.",
            level.lag()
        ),
        None => format!(
            "Welcome to the {}-back test.\nPress SPACE to start.",
            level.lag()
        ),
    }
}
