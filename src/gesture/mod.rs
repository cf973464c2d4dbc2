pub mod event;
pub mod matcher;
pub mod program;

pub use event::{Event, EventHistory};
pub use matcher::fits;
pub use program::{Program, ProgramBuilder, ProgramStep, POCKET, WAVE_TO_WAKE};
