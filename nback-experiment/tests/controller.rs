mod common;

use common::{MS, RecordingLogger, RecordingRenderer, ScriptedInput};
use nback_core::{ControllerState, Level, ResponseEvent, Signal};
use nback_experiment::state::SELECT_PROMPT;
use nback_experiment::telemetry::AnnotationEntry;
use nback_experiment::{
    Annotation, ConfigurationError, ExperimentConfig, JsonlAnnotationLog, RunError, RunOutcome, Sequence,
    SequenceGenerator, Session, TestConfiguration, TimedResponse, TrialController, is_match,
};
use nback_timing::{SimulatedTimer, Timer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::time::Duration;

/// Level chosen at 5 ms, start pressed at 10 ms: stimulus `k` appears at
/// 10 ms + k * (500 ms window + 500 ms blank).
fn onset_ms(k: usize) -> u64 {
    10 + 1_000 * k as u64
}

fn config(length: usize, forced: usize) -> ExperimentConfig {
    ExperimentConfig {
        sequence_length: length,
        forced_matches: forced,
        ..ExperimentConfig::default()
    }
}

fn expected_sequence(level: Level, config: &ExperimentConfig, seed: u64) -> Sequence {
    let configuration =
        TestConfiguration::new(level, config.sequence_length, config.forced_matches).unwrap();
    SequenceGenerator::new()
        .generate(&mut StdRng::seed_from_u64(seed), &configuration)
        .unwrap()
}

struct Harness {
    timer: SimulatedTimer,
    renderer: RecordingRenderer,
    logger: RecordingLogger,
}

impl Harness {
    fn new() -> Self {
        Self {
            timer: SimulatedTimer::new(),
            renderer: RecordingRenderer::default(),
            logger: RecordingLogger::default(),
        }
    }

    fn run(
        &mut self,
        config: ExperimentConfig,
        input: &mut ScriptedInput,
        seed: u64,
    ) -> Result<RunOutcome, RunError> {
        let session = Session::new(&mut self.renderer, input, &mut self.logger);
        TrialController::new(
            config,
            session,
            self.timer.clone(),
            StdRng::seed_from_u64(seed),
        )
        .run()
    }
}

#[test]
fn press_inside_window_on_a_match_is_scored_correct() {
    let config = config(6, 2);
    let sequence = expected_sequence(Level::Zero, &config, 42);
    let target = sequence.target().unwrap();
    let m = sequence.match_positions()[0];

    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::Zero))
        .at(10, Signal::Press)
        .at(onset_ms(m) + 100, Signal::Press)
        // lands in the blank that follows, so belongs to no window
        .at(onset_ms(m) + 700, Signal::Press);

    let outcome = h.run(config, &mut input, 42).unwrap();
    let RunOutcome::Completed(test) = outcome else {
        panic!("expected a completed run");
    };

    assert_eq!(test.sequence, sequence);
    assert_eq!(test.trials.len(), 6);
    assert_eq!(test.trials[m].presented_at_ns, onset_ms(m) * MS);
    assert_eq!(
        test.trials[m].responses,
        vec![ResponseEvent {
            correct: true,
            observed_at_ns: (onset_ms(m) + 100) * MS,
        }]
    );
    let other_responses: usize = test
        .trials
        .iter()
        .filter(|t| t.index != m)
        .map(|t| t.responses.len())
        .sum();
    assert_eq!(other_responses, 0);

    assert_eq!(
        test.results.correct(),
        &[TimedResponse {
            digit: target,
            observed_at_ns: (onset_ms(m) + 100) * MS,
        }]
    );
    assert!(test.results.incorrect().is_empty());

    let responses = h.logger.named(Annotation::RESPONSE);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].data, json!({ "Correct": true }));
}

#[test]
fn press_at_the_window_boundary_is_not_recorded() {
    let config = config(4, 1);
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press)
        .at(onset_ms(1) + 500, Signal::Press);

    let outcome = h.run(config, &mut input, 9).unwrap();
    let test = outcome.session().unwrap();
    assert!(test.trials.iter().all(|t| t.responses.is_empty()));
    assert!(h.logger.named(Annotation::RESPONSE).is_empty());
}

#[test]
fn press_on_a_non_match_is_scored_incorrect() {
    let config = config(6, 2);
    let sequence = expected_sequence(Level::Two, &config, 11);
    // Positions 0 and 1 can never match at lag 2.
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::Two))
        .at(10, Signal::Press)
        .at(onset_ms(0) + 250, Signal::Press);

    let outcome = h.run(config, &mut input, 11).unwrap();
    let test = outcome.session().unwrap();
    assert_eq!(
        test.results.incorrect(),
        &[TimedResponse {
            digit: sequence[0].value,
            observed_at_ns: (onset_ms(0) + 250) * MS,
        }]
    );
    assert_eq!(
        h.logger.named(Annotation::RESPONSE)[0].data,
        json!({ "Correct": false })
    );
}

#[test]
fn every_press_in_a_window_is_recorded() {
    let config = config(4, 1);
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press)
        .at(onset_ms(2) + 50, Signal::Press)
        .at(onset_ms(2) + 60, Signal::Press)
        .at(onset_ms(2) + 490, Signal::Press);

    let outcome = h.run(config, &mut input, 5).unwrap();
    let test = outcome.session().unwrap();
    let times: Vec<u64> = test.trials[2]
        .responses
        .iter()
        .map(|r| r.observed_at_ns / MS)
        .collect();
    assert_eq!(times, vec![onset_ms(2) + 50, onset_ms(2) + 60, onset_ms(2) + 490]);
    assert_eq!(h.logger.named(Annotation::RESPONSE).len(), 3);
}

#[test]
fn full_run_brackets_annotations_and_flags_matches() {
    let config = ExperimentConfig::default();
    let sequence = expected_sequence(Level::One, &config, 3);

    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press);
    for k in 0..config.sequence_length {
        input = input.at(onset_ms(k) + 100, Signal::Press);
    }

    let outcome = h.run(config.clone(), &mut input, 3).unwrap();
    let RunOutcome::Completed(test) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(input.remaining(), 0);

    let names = h.logger.names();
    assert_eq!(names.first(), Some(&Annotation::TEST_START));
    assert_eq!(names.last(), Some(&Annotation::TEST_END));
    assert_eq!(names.len(), 2 + 2 * config.sequence_length);
    for pair in names[1..names.len() - 1].chunks(2) {
        assert_eq!(pair, [Annotation::STIMULI, Annotation::RESPONSE]);
    }
    assert_eq!(h.logger.annotations[0].data, json!({ "N": 1 }));

    let stimuli = h.logger.named(Annotation::STIMULI);
    for (i, annotation) in stimuli.iter().enumerate() {
        let expected = is_match(sequence.stimuli(), i, sequence.rule());
        assert_eq!(annotation.data["matches"], json!(expected), "stimulus {i}");
        assert_eq!(annotation.data["digit"], json!(sequence[i].value.as_str()));
    }

    let summary = test.summary();
    let matches = sequence.match_positions().len();
    assert_eq!(matches, config.forced_matches);
    assert_eq!(summary.hits, matches);
    assert_eq!(summary.misses, 0);
    assert_eq!(summary.correct.len(), matches);
    assert_eq!(summary.false_alarms, config.sequence_length - matches);
    assert_eq!(h.logger.shutdowns, 1);

    let last_onset = onset_ms(config.sequence_length - 1);
    assert_eq!(h.timer.now(), (last_onset + 1_000 + 3_000) * MS);
}

#[test]
fn cancel_mid_presentation_ends_the_test_once() {
    let config = config(10, 3);
    let sequence = expected_sequence(Level::Two, &config, 7);

    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::Two))
        .at(10, Signal::Press)
        .at(onset_ms(1) + 200, Signal::Cancel);

    let outcome = h.run(config, &mut input, 7).unwrap();
    let RunOutcome::Cancelled(test) = outcome else {
        panic!("expected a cancelled run");
    };

    assert_eq!(test.trials.len(), 2);
    assert_eq!(
        h.logger.names(),
        vec![
            Annotation::TEST_START,
            Annotation::STIMULI,
            Annotation::STIMULI,
            Annotation::TEST_END,
        ]
    );
    assert_eq!(h.logger.shutdowns, 1);

    let welcome = nback_experiment::state::welcome_message(Level::Two, None);
    assert_eq!(
        h.renderer.frames,
        vec![
            SELECT_PROMPT.to_string(),
            welcome,
            sequence[0].value.as_str().to_string(),
            "#".to_string(),
            sequence[1].value.as_str().to_string(),
        ]
    );
    assert_eq!(h.timer.now(), (onset_ms(1) + 200 + 3_000) * MS);
}

#[test]
fn cancel_during_blank_stops_before_the_next_stimulus() {
    let config = config(5, 1);
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press)
        .at(onset_ms(0) + 700, Signal::Cancel);

    let outcome = h.run(config, &mut input, 1).unwrap();
    assert!(matches!(&outcome, RunOutcome::Cancelled(t) if t.trials.len() == 1));
    assert_eq!(
        h.logger.names(),
        vec![Annotation::TEST_START, Annotation::STIMULI, Annotation::TEST_END]
    );
}

#[test]
fn cancel_on_welcome_screen_still_closes_the_test() {
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::Three))
        .at(8, Signal::Cancel);

    let outcome = h.run(config(8, 2), &mut input, 2).unwrap();
    assert!(matches!(&outcome, RunOutcome::Cancelled(t) if t.trials.is_empty()));
    assert_eq!(h.logger.names(), vec![Annotation::TEST_START, Annotation::TEST_END]);
    assert_eq!(h.logger.annotations[1].data, json!({ "N": 3 }));
}

#[test]
fn cancel_at_level_selection_emits_nothing() {
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer).at(5, Signal::Cancel);

    let outcome = h.run(ExperimentConfig::default(), &mut input, 0).unwrap();
    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(h.logger.annotations.is_empty());
    assert_eq!(h.logger.shutdowns, 1);
    assert_eq!(h.renderer.frames, vec![SELECT_PROMPT.to_string()]);
}

#[test]
fn presses_before_a_level_is_chosen_are_ignored() {
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(2, Signal::Press)
        .at(5, Signal::Select(Level::Zero))
        .at(10, Signal::Press);

    let outcome = h.run(config(3, 1), &mut input, 4).unwrap();
    assert!(matches!(&outcome, RunOutcome::Completed(t) if t.trials.len() == 3));
}

#[test]
fn infeasible_configuration_fails_before_any_annotation() {
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer).at(5, Signal::Select(Level::Two));

    let err = h.run(config(4, 4), &mut input, 0).unwrap_err();
    assert!(matches!(
        err,
        RunError::Configuration(ConfigurationError::TooManyForcedMatches {
            requested: 4,
            available: 2,
            lag: 2,
        })
    ));
    assert!(h.logger.annotations.is_empty());
    assert_eq!(h.logger.shutdowns, 1);
    assert_eq!(h.renderer.frames, vec![SELECT_PROMPT.to_string()]);
}

#[test]
fn logger_failures_do_not_interrupt_the_run() {
    let mut h = Harness::new();
    h.logger = RecordingLogger::failing();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press)
        .at(onset_ms(1) + 100, Signal::Press);

    let outcome = h.run(config(4, 1), &mut input, 8).unwrap();
    assert!(matches!(&outcome, RunOutcome::Completed(t) if t.trials.len() == 4));
    assert_eq!(h.logger.names().last(), Some(&Annotation::TEST_END));
}

#[test]
fn renderer_failure_still_tears_down() {
    let mut h = Harness::new();
    // prompt, welcome and the first digit render; the blank does not
    h.renderer.fail_on_frame = Some(3);
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press);

    let err = h.run(config(4, 1), &mut input, 8).unwrap_err();
    assert!(matches!(err, RunError::Collaborator(_)));
    assert_eq!(h.logger.names().last(), Some(&Annotation::TEST_END));
    assert_eq!(h.logger.named(Annotation::TEST_END).len(), 1);
    assert_eq!(h.logger.shutdowns, 1);
}

#[test]
fn controller_starts_in_level_selection() {
    let timer = SimulatedTimer::new();
    let mut renderer = RecordingRenderer::default();
    let mut logger = RecordingLogger::default();
    let mut input = ScriptedInput::new(&timer);
    let controller = TrialController::new(
        ExperimentConfig::default(),
        Session::new(&mut renderer, &mut input, &mut logger),
        timer.clone(),
        StdRng::seed_from_u64(0),
    );
    assert_eq!(controller.state(), ControllerState::SelectingLevel);
}

#[test]
fn annotation_log_shares_the_response_clock() {
    let timer = SimulatedTimer::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.jsonl");
    let mut log = JsonlAnnotationLog::create(&path, timer.clone()).unwrap();

    // window setup and font loading happen between opening the log and the run
    timer.advance(Duration::from_secs(2));

    let mut renderer = RecordingRenderer::default();
    let mut input = ScriptedInput::new(&timer)
        .at(2_005, Signal::Select(Level::Two))
        .at(2_010, Signal::Press)
        .at(2_260, Signal::Press);
    let outcome = TrialController::new(
        config(4, 1),
        Session::new(&mut renderer, &mut input, &mut log),
        timer.clone(),
        StdRng::seed_from_u64(12),
    )
    .run()
    .unwrap();
    let trial = &outcome.session().unwrap().trials[0];

    let entries: Vec<AnnotationEntry> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let stamp = |name: &str| {
        entries
            .iter()
            .find(|e| e.annotation.name == name)
            .map(|e| e.session_ns)
            .unwrap()
    };

    assert_eq!(trial.responses[0].observed_at_ns, 2_260 * MS);
    assert_eq!(stamp(Annotation::RESPONSE), trial.responses[0].observed_at_ns);
    assert_eq!(stamp(Annotation::STIMULI), trial.presented_at_ns);
    assert_eq!(stamp(Annotation::TEST_START), 2_005 * MS);
}

#[test]
fn input_is_not_polled_during_the_blank() {
    let mut h = Harness::new();
    let mut input = ScriptedInput::new(&h.timer)
        .at(5, Signal::Select(Level::One))
        .at(10, Signal::Press);

    h.run(config(3, 1), &mut input, 6).unwrap();

    for k in 0..3 {
        let window_end = (onset_ms(k) + 500) * MS;
        let blank_end = (onset_ms(k) + 1_000) * MS;
        assert!(input.polled_at.contains(&(window_end - MS)), "stimulus {k}");
        assert!(
            !input
                .polled_at
                .iter()
                .any(|&t| t > window_end - MS && t < blank_end),
            "polled during blank {k}"
        );
    }
}
