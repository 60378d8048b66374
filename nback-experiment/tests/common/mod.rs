#![allow(dead_code)]

use nback_core::{InputSource, Renderer, Rgba, Signal};
use nback_experiment::{Annotation, OnComplete, TelemetryError, TelemetryLogger};
use nback_timing::{SimulatedTimer, Timer};
use std::collections::VecDeque;
use std::time::Duration;

pub const MS: u64 = 1_000_000;

/// Simulated time after which a waiting poll means the script forgot an
/// event the controller is blocked on.
const HORIZON_NS: u64 = 3_600_000 * MS;

#[derive(Default)]
pub struct RecordingRenderer {
    pub frames: Vec<String>,
    pub fail_on_frame: Option<usize>,
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, text: &str, _color: Rgba) -> anyhow::Result<()> {
        if self.fail_on_frame == Some(self.frames.len()) {
            anyhow::bail!("display surface lost");
        }
        self.frames.push(text.to_string());
        Ok(())
    }
}

/// Key signals released at fixed simulated times. Polling advances the
/// shared clock by at most the requested timeout.
pub struct ScriptedInput {
    timer: SimulatedTimer,
    script: VecDeque<(u64, Signal)>,
    /// Clock reading at every `poll` call.
    pub polled_at: Vec<u64>,
}

impl ScriptedInput {
    pub fn new(timer: &SimulatedTimer) -> Self {
        Self {
            timer: timer.clone(),
            script: VecDeque::new(),
            polled_at: Vec::new(),
        }
    }

    /// Queues `signal` at `at_ms` on the simulated clock.
    pub fn at(mut self, at_ms: u64, signal: Signal) -> Self {
        let at = at_ms * MS;
        if let Some(&(last, _)) = self.script.back() {
            assert!(at >= last, "script must be in time order");
        }
        self.script.push_back((at, signal));
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Signal>> {
        let now = self.timer.now();
        assert!(now < HORIZON_NS, "controller is waiting on input the script never sends");
        self.polled_at.push(now);
        let deadline = now + timeout.as_nanos() as u64;
        match self.script.front().copied() {
            Some((at, signal)) if at <= deadline => {
                self.script.pop_front();
                self.timer.advance_to(at);
                Ok(Some(signal))
            }
            _ => {
                self.timer.advance_to(deadline);
                Ok(None)
            }
        }
    }

    fn discard_pending(&mut self) -> anyhow::Result<bool> {
        let now = self.timer.now();
        let mut cancelled = false;
        while let Some(&(at, signal)) = self.script.front() {
            if at > now {
                break;
            }
            self.script.pop_front();
            cancelled |= signal == Signal::Cancel;
        }
        Ok(cancelled)
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub annotations: Vec<Annotation>,
    pub shutdowns: usize,
    pub fail: bool,
}

impl RecordingLogger {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.annotations.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn named(&self, name: &str) -> Vec<&Annotation> {
        self.annotations.iter().filter(|a| a.name == name).collect()
    }
}

impl TelemetryLogger for RecordingLogger {
    fn log_annotation(&mut self, annotation: Annotation, on_complete: OnComplete) {
        self.annotations.push(annotation);
        if self.fail {
            on_complete(Err(TelemetryError::Io(std::io::Error::other(
                "eye tracker link down",
            ))));
        } else {
            on_complete(Ok(()));
        }
    }

    fn shutdown(&mut self) {
        self.shutdowns += 1;
    }
}
