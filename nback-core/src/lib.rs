pub mod input;
pub mod level;
pub mod phase;
pub mod render;
pub mod stimulus;
pub mod trial;

pub use input::{InputSource, Signal};
pub use level::Level;
pub use phase::ControllerState;
pub use render::{BLACK, Renderer, Rgba, WHITE};
pub use stimulus::{Digit, Stimulus};
pub use trial::{ResponseEvent, TrialRecord};
