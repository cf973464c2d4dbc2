use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use anyhow::{bail, Result};
use chrono::Utc;

use crate::{
    gesture::{fits, Program},
    scheduler::Scheduler,
    settings::{GestureSettings, SettingsKey, SettingsListener},
};

use super::{
    listeners::{ListenerId, WakeEvent, WakeListener, WakeListeners},
    state::{PendingConfirmation, RecognizerSnapshot, RecognizerState, RecognizerStatus},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Readings below this distance count as near even when the hardware
/// reports a smaller maximum range.
const NEAR_DISTANCE_FLOOR_CM: f32 = 1.0;

/// What a single raw sample did to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The recognizer is stopped.
    Ignored,
    /// Same polarity as the last recorded transition.
    Debounced,
    /// A transition was recorded; `confirmation` is the delay of the armed
    /// confirmation if a program matched.
    Recorded { confirmation: Option<Duration> },
}

/// Turns raw proximity readings into wake requests.
///
/// Cloning yields another handle to the same recognizer. All state sits behind
/// one mutex, so recording a transition (and cancelling the armed
/// confirmation) and a confirmation firing never interleave.
#[derive(Clone)]
pub struct ProximityRecognizer {
    name: Arc<str>,
    state: Arc<Mutex<RecognizerState>>,
    listeners: WakeListeners,
    scheduler: Arc<dyn Scheduler>,
}

impl ProximityRecognizer {
    pub fn new(name: impl Into<String>, settings: &GestureSettings, scheduler: Arc<dyn Scheduler>) -> Self {
        let name: String = name.into();
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(RecognizerState::new(settings))),
            listeners: WakeListeners::default(),
            scheduler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> RecognizerStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> RecognizerSnapshot {
        RecognizerSnapshot::capture(&self.name, &self.lock())
    }

    /// Starts listening: clears the history and seeds it with a far event at
    /// `now`.
    pub fn start(&self, now: Duration) -> Result<()> {
        let mut state = self.lock();
        if state.is_listening() {
            bail!("recognizer {} already listening", self.name);
        }
        self.start_locked(&mut state, now);
        Ok(())
    }

    /// Stops listening and drops any armed confirmation. Stopping a stopped
    /// recognizer is a no-op.
    pub fn stop(&self) {
        let mut state = self.lock();
        self.stop_locked(&mut state);
    }

    /// Reference-counted start: only the first attach starts listening.
    pub fn attach(&self, now: Duration) -> Result<()> {
        let mut state = self.lock();
        state.attached += 1;
        if state.attached == 1 && !state.is_listening() {
            self.start_locked(&mut state, now);
        }
        Ok(())
    }

    /// Reference-counted stop: only the last detach stops listening.
    pub fn detach(&self) -> Result<()> {
        let mut state = self.lock();
        if state.attached == 0 {
            bail!("recognizer {} is not attached", self.name);
        }
        state.attached -= 1;
        if state.attached == 0 {
            self.stop_locked(&mut state);
        }
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.lock().attached > 0
    }

    /// Feeds a raw distance reading in centimetres.
    pub fn on_distance(&self, distance_cm: f32, now: Duration) -> Result<SampleOutcome> {
        let max_range = self.lock().max_range_cm;
        let is_near = distance_cm < max_range || distance_cm < NEAR_DISTANCE_FLOOR_CM;
        self.on_sample(is_near, now)
    }

    /// Feeds a raw near/far reading. Timestamps must not go backwards.
    pub fn on_sample(&self, is_near: bool, now: Duration) -> Result<SampleOutcome> {
        let mut state = self.lock();
        if !state.is_listening() {
            return Ok(SampleOutcome::Ignored);
        }

        if let Some(last) = state.last_sample_at {
            if now < last {
                bail!(
                    "sample at {}ms precedes previous sample at {}ms",
                    now.as_millis(),
                    last.as_millis()
                );
            }
        }
        state.last_sample_at = Some(now);

        if state.last_raw_near != is_near || state.last_change_at.is_none() {
            state.last_change_at = Some(now);
        }
        state.last_raw_near = is_near;

        if !state.history.append(is_near, now) {
            log_debug!("{}: debounced is_near={} at {}ms", self.name, is_near, now.as_millis());
            return Ok(SampleOutcome::Debounced);
        }

        state.cancel_pending();

        if state.first_change {
            state.first_change = false;
            state.relaxed_ordinal = state.history.last_ordinal();
        }

        let mut best: Option<(Duration, String)> = None;
        for program in state.programs.iter() {
            if let Some(delay) = fits(program, &state.history, state.relaxed_ordinal) {
                if best.as_ref().map_or(true, |(current, _)| delay < *current) {
                    best = Some((delay, program.name().to_string()));
                }
            }
        }

        log_debug!(
            "{}: is_near={} at {}ms, history={}, matched={:?}",
            self.name,
            is_near,
            now.as_millis(),
            state.history.len(),
            best.as_ref().map(|(_, name)| name.as_str())
        );

        let confirmation = best.map(|(delay, program)| {
            self.arm_locked(&mut state, program, now, delay);
            delay
        });

        Ok(SampleOutcome::Recorded { confirmation })
    }

    /// `true` while the last reading was near and either the recognizer is
    /// listening or that reading is younger than the configured hold time.
    pub fn is_near(&self, now: Duration) -> bool {
        let state = self.lock();
        let fresh = state
            .last_change_at
            .is_some_and(|at| now.saturating_sub(at) < state.near_hold);
        state.last_raw_near && (state.is_listening() || fresh)
    }

    /// Adds `program` to the active set. Returns `false` if it was already
    /// there.
    pub fn enable_program(&self, program: Program) -> bool {
        let mut state = self.lock();
        state.history.grow_capacity(program.step_count());
        let name = program.name().to_string();
        let added = state.programs.insert(program);
        if added {
            log_info!("{}: enabled program {}", self.name, name);
        }
        added
    }

    /// Removes `program` from the active set. Returns `false` if it was not
    /// there.
    pub fn disable_program(&self, program: &Program) -> bool {
        let removed = self.lock().programs.remove(program);
        if removed {
            log_info!("{}: disabled program {}", self.name, program.name());
        }
        removed
    }

    pub fn active_programs(&self) -> Vec<Program> {
        self.lock().programs.iter().cloned().collect()
    }

    /// Brings programs and sensor parameters in line with `settings`. History
    /// and any armed confirmation are left alone.
    pub fn apply_settings(&self, settings: &GestureSettings) {
        let mut state = self.lock();
        let pocket = settings.pocket.program();
        let wave = settings.wave_to_wake.program();
        state
            .history
            .grow_capacity(pocket.step_count().max(wave.step_count()));

        if state.programs.replace_named(pocket) {
            log_info!("{}: pocket program updated", self.name);
        }

        if settings.wave_to_wake.enabled {
            if state.programs.replace_named(wave) {
                log_info!("{}: wave-to-wake program enabled", self.name);
            }
        } else if state.programs.remove_named(crate::gesture::WAVE_TO_WAKE) {
            log_info!("{}: wave-to-wake program disabled", self.name);
        }

        state.near_hold = settings.near_hold();
        state.max_range_cm = settings.max_range_cm;
    }

    /// Callback for [`SettingsStore::subscribe`](crate::settings::SettingsStore::subscribe).
    pub fn settings_listener(&self) -> SettingsListener {
        let recognizer = self.clone();
        Arc::new(move |settings: &GestureSettings, _key: SettingsKey| {
            recognizer.apply_settings(settings)
        })
    }

    pub fn register_listener(&self, listener: Arc<dyn WakeListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    fn start_locked(&self, state: &mut RecognizerState, now: Duration) {
        log_info!("{}: starting at {}ms", self.name, now.as_millis());
        state.begin_listening(now, Utc::now());
    }

    fn stop_locked(&self, state: &mut RecognizerState) {
        if !state.is_listening() {
            return;
        }
        log_info!("{}: stopping", self.name);
        state.stop();
    }

    fn arm_locked(&self, state: &mut RecognizerState, program: String, now: Duration, delay: Duration) {
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        let weak_state = Arc::downgrade(&self.state);
        let listeners = self.listeners.clone();
        let name = self.name.clone();
        let cancel_token = self.scheduler.schedule(
            delay,
            Box::new(move || confirm(&name, &weak_state, &listeners, generation)),
        );

        state.pending = Some(PendingConfirmation {
            generation,
            program,
            due_at: now.saturating_add(delay),
            cancel_token,
        });
        state.status = RecognizerStatus::Confirming;
    }

    fn lock(&self) -> MutexGuard<'_, RecognizerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs when an armed confirmation elapses. A confirmation that was replaced
/// or cancelled in the meantime finds a different generation and does nothing.
fn confirm(name: &str, weak_state: &Weak<Mutex<RecognizerState>>, listeners: &WakeListeners, generation: u64) {
    let Some(state) = weak_state.upgrade() else {
        return;
    };

    let event = {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let current = state.pending.as_ref().map(|p| p.generation);
        if current != Some(generation) {
            log_warn!("{}: stale confirmation {} dropped", name, generation);
            return;
        }
        let Some(pending) = state.pending.take() else {
            return;
        };

        state.history.clear();
        state.status = RecognizerStatus::Listening;
        state.wake_count += 1;

        WakeEvent {
            recognizer: name.to_string(),
            program: pending.program,
            at_ms: u64::try_from(pending.due_at.as_millis()).unwrap_or(u64::MAX),
            requested_at: Utc::now(),
        }
    };

    log_info!("{}: wake requested by {} program", name, event.program);
    listeners.notify(&event);
}
