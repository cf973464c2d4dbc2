use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::gesture::{Event, EventHistory, Program};
use crate::settings::GestureSettings;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecognizerStatus {
    Stopped,
    Listening,
    /// Listening with an armed confirmation.
    Confirming,
}

impl Default for RecognizerStatus {
    fn default() -> Self {
        RecognizerStatus::Stopped
    }
}

/// Programs currently evaluated on every transition. Behaves as a set.
#[derive(Debug, Clone, Default)]
pub struct ActivePrograms {
    programs: Vec<Program>,
}

impl ActivePrograms {
    pub fn insert(&mut self, program: Program) -> bool {
        if self.programs.contains(&program) {
            return false;
        }
        self.programs.push(program);
        true
    }

    pub fn remove(&mut self, program: &Program) -> bool {
        let before = self.programs.len();
        self.programs.retain(|existing| existing != program);
        self.programs.len() != before
    }

    pub fn remove_named(&mut self, name: &str) -> bool {
        let before = self.programs.len();
        self.programs.retain(|existing| existing.name() != name);
        self.programs.len() != before
    }

    /// Swaps whatever program carries the same name for `program`.
    pub fn replace_named(&mut self, program: Program) -> bool {
        if self.programs.contains(&program) {
            return false;
        }
        self.remove_named(program.name());
        self.programs.push(program);
        true
    }

    pub fn contains(&self, program: &Program) -> bool {
        self.programs.contains(program)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.programs.iter().map(|p| p.name().to_string()).collect()
    }
}

#[derive(Debug)]
pub(crate) struct PendingConfirmation {
    pub generation: u64,
    pub program: String,
    pub due_at: Duration,
    pub cancel_token: CancellationToken,
}

#[derive(Debug)]
pub(crate) struct RecognizerState {
    pub status: RecognizerStatus,
    pub history: EventHistory,
    pub programs: ActivePrograms,
    pub pending: Option<PendingConfirmation>,
    pub generation: u64,
    /// Set by `start`, consumed by the first recorded transition.
    pub first_change: bool,
    pub relaxed_ordinal: Option<u64>,
    pub last_raw_near: bool,
    pub last_sample_at: Option<Duration>,
    pub last_change_at: Option<Duration>,
    pub attached: u32,
    pub wake_count: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub near_hold: Duration,
    pub max_range_cm: f32,
}

impl RecognizerState {
    pub fn new(settings: &GestureSettings) -> Self {
        let pocket = settings.pocket.program();
        let wave = settings.wave_to_wake.program();

        // Size the buffer for every known program, enabled or not, so
        // toggling one on later never starts from a truncated history.
        let capacity = pocket.step_count().max(wave.step_count());

        let mut programs = ActivePrograms::default();
        programs.insert(pocket);
        if settings.wave_to_wake.enabled {
            programs.insert(wave);
        }

        Self {
            status: RecognizerStatus::Stopped,
            history: EventHistory::with_capacity(capacity),
            programs,
            pending: None,
            generation: 0,
            first_change: false,
            relaxed_ordinal: None,
            last_raw_near: false,
            last_sample_at: None,
            last_change_at: None,
            attached: 0,
            wake_count: 0,
            started_at: None,
            near_hold: settings.near_hold(),
            max_range_cm: settings.max_range_cm,
        }
    }

    /// Drops any armed confirmation. Returns `true` if one was armed.
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.cancel_token.cancel();
                if self.status == RecognizerStatus::Confirming {
                    self.status = RecognizerStatus::Listening;
                }
                true
            }
            None => false,
        }
    }

    pub fn begin_listening(&mut self, now: Duration, started_at: DateTime<Utc>) {
        self.cancel_pending();
        self.history.clear();
        self.history.append(false, now);
        self.first_change = true;
        self.relaxed_ordinal = None;
        self.last_raw_near = false;
        self.last_sample_at = Some(now);
        self.status = RecognizerStatus::Listening;
        self.started_at = Some(started_at);
    }

    pub fn stop(&mut self) {
        self.cancel_pending();
        self.history.clear();
        self.first_change = false;
        self.relaxed_ordinal = None;
        self.status = RecognizerStatus::Stopped;
        self.started_at = None;
    }

    pub fn is_listening(&self) -> bool {
        self.status != RecognizerStatus::Stopped
    }
}

/// Read-only view of a recognizer, suitable for logging or diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerSnapshot {
    pub name: String,
    pub status: RecognizerStatus,
    pub history: Vec<Event>,
    pub active_programs: Vec<String>,
    pub pending_program: Option<String>,
    pub pending_due_ms: Option<u64>,
    pub attached: u32,
    pub wake_count: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl RecognizerSnapshot {
    pub(crate) fn capture(name: &str, state: &RecognizerState) -> Self {
        Self {
            name: name.to_string(),
            status: state.status,
            history: state.history.events(),
            active_programs: state.programs.names(),
            pending_program: state.pending.as_ref().map(|p| p.program.clone()),
            pending_due_ms: state
                .pending
                .as_ref()
                .map(|p| u64::try_from(p.due_at.as_millis()).unwrap_or(u64::MAX)),
            attached: state.attached,
            wake_count: state.wake_count,
            started_at: state.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::program::{POCKET_NEAR_MIN, WAVE_TO_WAKE};

    #[test]
    fn active_programs_behave_as_a_set() {
        let mut programs = ActivePrograms::default();
        let pocket = Program::pocket(POCKET_NEAR_MIN);
        assert!(programs.insert(pocket.clone()));
        assert!(!programs.insert(pocket.clone()));
        assert_eq!(programs.len(), 1);

        assert!(programs.remove(&pocket));
        assert!(!programs.remove(&pocket));
        assert!(programs.is_empty());
    }

    #[test]
    fn replace_named_swaps_variants() {
        let mut programs = ActivePrograms::default();
        let slow = Program::wave_to_wake(
            Duration::from_millis(200),
            Duration::from_millis(1500),
            Duration::from_millis(1500),
        );
        let fast = Program::wave_to_wake(
            Duration::from_millis(100),
            Duration::from_millis(800),
            Duration::from_millis(800),
        );
        programs.insert(slow.clone());
        assert!(programs.replace_named(fast.clone()));
        assert!(!programs.replace_named(fast.clone()));
        assert!(programs.contains(&fast));
        assert!(!programs.contains(&slow));
        assert_eq!(programs.names(), vec![WAVE_TO_WAKE.to_string()]);
    }

    #[test]
    fn capacity_covers_disabled_programs() {
        let mut settings = GestureSettings::default();
        settings.wave_to_wake.enabled = false;
        let state = RecognizerState::new(&settings);
        assert_eq!(state.programs.len(), 1);
        assert_eq!(state.history.capacity(), 4);
    }

    #[test]
    fn begin_listening_seeds_far_event() {
        let mut state = RecognizerState::new(&GestureSettings::default());
        state.begin_listening(Duration::from_millis(42), Utc::now());
        assert_eq!(state.status, RecognizerStatus::Listening);
        assert_eq!(
            state.history.events(),
            vec![Event::new(false, Duration::from_millis(42))]
        );
        assert!(state.first_change);
    }
}
