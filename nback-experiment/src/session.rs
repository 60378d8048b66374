use crate::config::TestConfiguration;
use crate::results::{ResultsAggregator, Summary};
use crate::sequence::Sequence;
use crate::telemetry::TelemetryLogger;
use nback_core::{InputSource, Renderer, ResponseEvent, TrialRecord};

/// The external collaborators a run talks to, constructed once by the
/// caller and lent to the controller.
pub struct Session<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub input: &'a mut dyn InputSource,
    pub logger: &'a mut dyn TelemetryLogger,
}

impl<'a> Session<'a> {
    pub fn new(
        renderer: &'a mut dyn Renderer,
        input: &'a mut dyn InputSource,
        logger: &'a mut dyn TelemetryLogger,
    ) -> Self {
        Self {
            renderer,
            input,
            logger,
        }
    }
}

/// Everything recorded during one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSession {
    pub configuration: TestConfiguration,
    pub sequence: Sequence,
    pub trials: Vec<TrialRecord>,
    pub results: ResultsAggregator,
}

impl TestSession {
    pub fn new(configuration: TestConfiguration, sequence: Sequence) -> Self {
        Self {
            configuration,
            trials: Vec::with_capacity(sequence.len()),
            sequence,
            results: ResultsAggregator::new(),
        }
    }

    pub fn begin_trial(&mut self, index: usize, presented_at_ns: u64) {
        self.trials
            .push(TrialRecord::new(index, self.sequence[index], presented_at_ns));
    }

    /// Attaches a press to the most recent trial.
    pub fn record_response(&mut self, event: ResponseEvent) {
        if let Some(trial) = self.trials.last_mut() {
            trial.push_response(event);
            self.results.record(trial.stimulus.value, event);
        }
    }

    pub fn summary(&self) -> Summary {
        self.results
            .summarize(&self.configuration, &self.sequence, &self.trials)
    }
}
