//! Annotation records for the eye-tracking pipeline and a file-backed sink.

use crate::error::TelemetryError;
use chrono::Utc;
use nback_core::Digit;
use nback_timing::Timer;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the annotation that brackets one run.
pub const EXPERIMENT: &str = "experiment";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationId {
    Index(u64),
    Name(String),
}

impl AnnotationId {
    pub fn root() -> Self {
        AnnotationId::Index(0)
    }

    pub fn experiment() -> Self {
        AnnotationId::Name(EXPERIMENT.to_string())
    }
}

/// A named, structured event. Test.start/Test.end carry the experiment id
/// under the root; per-stimulus and per-response records hang off the
/// experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub parent: AnnotationId,
    pub name: String,
    pub data: serde_json::Value,
}

impl Annotation {
    pub const TEST_START: &'static str = "Test.start";
    pub const STIMULI: &'static str = "Stimuli";
    pub const RESPONSE: &'static str = "Response";
    pub const TEST_END: &'static str = "Test.end";

    pub fn test_start(lag: usize) -> Self {
        Self::bracket(Self::TEST_START, lag)
    }

    pub fn test_end(lag: usize) -> Self {
        Self::bracket(Self::TEST_END, lag)
    }

    pub fn stimulus(digit: Digit, matches: bool) -> Self {
        Self::trial_event(
            Self::STIMULI,
            json!({ "digit": digit.as_str(), "matches": matches }),
        )
    }

    pub fn response(correct: bool) -> Self {
        Self::trial_event(Self::RESPONSE, json!({ "Correct": correct }))
    }

    fn bracket(name: &str, lag: usize) -> Self {
        Self {
            id: AnnotationId::experiment(),
            parent: AnnotationId::root(),
            name: name.to_string(),
            data: json!({ "N": lag }),
        }
    }

    fn trial_event(name: &str, data: serde_json::Value) -> Self {
        Self {
            id: AnnotationId::root(),
            parent: AnnotationId::experiment(),
            name: name.to_string(),
            data,
        }
    }
}

/// Completion callback for one annotation. Its outcome is never reported
/// back to the caller of [`TelemetryLogger::log_annotation`].
pub type OnComplete = Box<dyn FnOnce(Result<(), TelemetryError>) + Send>;

pub fn ignore_completion() -> OnComplete {
    Box::new(|_: Result<(), TelemetryError>| {})
}

/// Receiver of annotations. Calls are fire-and-forget: implementations
/// report failures only through `on_complete` and must not panic.
pub trait TelemetryLogger {
    fn log_annotation(&mut self, annotation: Annotation, on_complete: OnComplete);

    /// Closes the logging session. Later annotations fail with
    /// [`TelemetryError::Closed`].
    fn shutdown(&mut self);
}

/// One line of a JSONL annotation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationEntry {
    /// RFC 3339 wall-clock time the record was written.
    pub timestamp: String,
    /// Session clock reading, on the same time base as the controller's
    /// stimulus and response stamps.
    pub session_ns: u64,
    #[serde(flatten)]
    pub annotation: Annotation,
}

/// Append-only JSONL annotation sink. Entries are stamped from `clock`,
/// which should be a clone of the controller's timer.
pub struct JsonlAnnotationLog<T: Timer<Timestamp = u64>> {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    clock: T,
    written: usize,
}

impl<T: Timer<Timestamp = u64>> JsonlAnnotationLog<T> {
    pub fn create(path: impl AsRef<Path>, clock: T) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "annotation log opened");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            clock,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn write_entry(&mut self, annotation: Annotation) -> Result<(), TelemetryError> {
        let writer = self.writer.as_mut().ok_or(TelemetryError::Closed)?;
        let entry = AnnotationEntry {
            timestamp: Utc::now().to_rfc3339(),
            session_ns: self.clock.now(),
            annotation,
        };
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        // One line per flush so a crash keeps everything logged so far.
        writer.flush()?;
        self.written += 1;
        debug!(name = %entry.annotation.name, data = %entry.annotation.data, "annotation");
        Ok(())
    }
}

impl<T: Timer<Timestamp = u64>> TelemetryLogger for JsonlAnnotationLog<T> {
    fn log_annotation(&mut self, annotation: Annotation, on_complete: OnComplete) {
        let name = annotation.name.clone();
        let result = self.write_entry(annotation);
        if let Err(e) = &result {
            warn!(%name, error = %e, "annotation not written");
        }
        on_complete(result);
    }

    fn shutdown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "failed to flush annotation log");
            }
            info!(
                path = %self.path.display(),
                annotations = self.written,
                "annotation log closed"
            );
        }
    }
}

impl<T: Timer<Timestamp = u64>> Drop for JsonlAnnotationLog<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
