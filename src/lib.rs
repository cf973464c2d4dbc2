//! Proximity-sensor gesture recognition.
//!
//! Raw near/far readings go in, a wake request comes out when the readings
//! match one of the active gesture programs: taking the device out of a
//! pocket, or waving a hand over the sensor.
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use proximity_wake::{GestureSettings, ProximityRecognizer, TokioScheduler, WakeEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     proximity_wake::init_logging();
//!
//!     let scheduler = Arc::new(TokioScheduler::new()?);
//!     let recognizer = ProximityRecognizer::new("proximity", &GestureSettings::default(), scheduler);
//!     recognizer.register_listener(Arc::new(|event: &WakeEvent| {
//!         println!("wake requested by {}", event.program);
//!     }));
//!
//!     recognizer.start(Duration::ZERO)?;
//!     recognizer.on_sample(true, Duration::from_millis(10))?;
//!     Ok(())
//! }
//! ```

pub mod gesture;
pub mod recognizer;
pub mod scheduler;
pub mod settings;
mod utils;

pub use gesture::{Event, EventHistory, Program, ProgramBuilder, ProgramStep};
pub use recognizer::{
    ListenerId, ProximityRecognizer, RecognizerSnapshot, RecognizerStatus, SampleOutcome, WakeEvent,
    WakeListener,
};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use settings::{GestureSettings, SettingsKey, SettingsStore, SubscriptionId};
pub use utils::logging::init_logging;
