pub mod config;
pub mod error;
pub mod evaluator;
pub mod results;
pub mod sequence;
pub mod session;
pub mod state;
pub mod telemetry;

pub use config::{ExperimentConfig, TestConfiguration};
pub use error::{ConfigurationError, RunError, TelemetryError};
pub use evaluator::{classify, is_match};
pub use results::{ResultsAggregator, Summary, TimedResponse};
pub use sequence::{MatchRule, RandomSource, Sequence, SequenceGenerator};
pub use session::{Session, TestSession};
pub use state::{RunOutcome, TrialController};
pub use telemetry::{Annotation, AnnotationId, JsonlAnnotationLog, OnComplete, TelemetryLogger};
