pub mod controller;
pub mod listeners;
pub mod state;

pub use controller::{ProximityRecognizer, SampleOutcome};
pub use listeners::{ListenerId, WakeEvent, WakeListener, WakeListeners};
pub use state::{ActivePrograms, RecognizerSnapshot, RecognizerStatus};
