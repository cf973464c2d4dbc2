use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use uuid::Uuid;

use crate::gesture::Program;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WaveToWakeSettings {
    pub enabled: bool,
    pub near_min_ms: u64,
    pub far_max_ms: u64,
    pub near_max_ms: u64,
}

impl Default for WaveToWakeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            near_min_ms: 200,
            far_max_ms: 1500,
            near_max_ms: 1500,
        }
    }
}

impl WaveToWakeSettings {
    pub fn program(&self) -> Program {
        Program::wave_to_wake(
            Duration::from_millis(self.near_min_ms),
            Duration::from_millis(self.far_max_ms),
            Duration::from_millis(self.near_max_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PocketSettings {
    pub near_min_ms: u64,
}

impl Default for PocketSettings {
    fn default() -> Self {
        Self { near_min_ms: 4000 }
    }
}

impl PocketSettings {
    pub fn program(&self) -> Program {
        Program::pocket(Duration::from_millis(self.near_min_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GestureSettings {
    pub wave_to_wake: WaveToWakeSettings,
    pub pocket: PocketSettings,
    /// How long a "near" reading stays trustworthy once the recognizer stops.
    pub near_hold_ms: u64,
    /// Maximum range reported by the proximity hardware, in centimetres.
    pub max_range_cm: f32,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            wave_to_wake: WaveToWakeSettings::default(),
            pocket: PocketSettings::default(),
            near_hold_ms: 1000,
            max_range_cm: 5.0,
        }
    }
}

impl GestureSettings {
    pub fn near_hold(&self) -> Duration {
        Duration::from_millis(self.near_hold_ms)
    }
}

/// Which part of the settings changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsKey {
    WaveToWake,
    Pocket,
    Sensor,
    All,
}

pub type SettingsListener = Arc<dyn Fn(&GestureSettings, SettingsKey) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<GestureSettings>,
    listeners: Mutex<Vec<(SubscriptionId, SettingsListener)>>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring malformed settings in {}: {}", path.display(), err);
                GestureSettings::default()
            })
        } else {
            GestureSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn settings(&self) -> GestureSettings {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_wave_to_wake_enabled(&self, enabled: bool) -> Result<()> {
        self.update(SettingsKey::WaveToWake, |data| {
            data.wave_to_wake.enabled = enabled;
        })
    }

    pub fn update_wave_to_wake(&self, settings: WaveToWakeSettings) -> Result<()> {
        self.update(SettingsKey::WaveToWake, |data| data.wave_to_wake = settings)
    }

    pub fn update_pocket(&self, settings: PocketSettings) -> Result<()> {
        self.update(SettingsKey::Pocket, |data| data.pocket = settings)
    }

    pub fn update_sensor(&self, near_hold_ms: u64, max_range_cm: f32) -> Result<()> {
        self.update(SettingsKey::Sensor, |data| {
            data.near_hold_ms = near_hold_ms;
            data.max_range_cm = max_range_cm;
        })
    }

    /// Registers a change callback. The caller owns the returned id and is
    /// expected to [`unsubscribe`](Self::unsubscribe) when done.
    pub fn subscribe(&self, listener: SettingsListener) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.lock_listeners().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn update(&self, key: SettingsKey, apply: impl FnOnce(&mut GestureSettings)) -> Result<()> {
        let snapshot = {
            let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
            let previous = guard.clone();
            apply(&mut *guard);
            if *guard == previous {
                return Ok(());
            }
            self.persist(&guard)?;
            guard.clone()
        };
        self.notify(&snapshot, key);
        Ok(())
    }

    fn persist(&self, data: &GestureSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn notify(&self, settings: &GestureSettings, key: SettingsKey) {
        let listeners: Vec<SettingsListener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(settings, key);
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, SettingsListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore {
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: GestureSettings = serde_json::from_str(&contents)?;
        {
            let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
            *guard = data.clone();
        }
        self.notify(&data, SettingsKey::All);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("gestures.json")).unwrap();
        assert_eq!(store.settings(), GestureSettings::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings(), GestureSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");
        fs::write(&path, r#"{ "waveToWake": { "enabled": false } }"#).unwrap();
        let store = SettingsStore::new(path).unwrap();
        let settings = store.settings();
        assert!(!settings.wave_to_wake.enabled);
        assert_eq!(settings.wave_to_wake.far_max_ms, 1500);
        assert_eq!(settings.pocket.near_min_ms, 4000);
    }

    #[test]
    fn updates_persist_and_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = store.subscribe(Arc::new(move |settings: &GestureSettings, key: SettingsKey| {
            assert_eq!(key, SettingsKey::WaveToWake);
            assert!(!settings.wave_to_wake.enabled);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store.set_wave_to_wake_enabled(false).unwrap();
        // unchanged value: no write, no notification
        store.set_wave_to_wake_enabled(false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let reopened = SettingsStore::new(path).unwrap();
        assert!(!reopened.settings().wave_to_wake.enabled);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn reload_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        store.update_pocket(PocketSettings { near_min_ms: 2500 }).unwrap();

        let mut edited = store.settings();
        edited.near_hold_ms = 400;
        fs::write(&path, serde_json::to_string(&edited).unwrap()).unwrap();

        store.reload().unwrap();
        assert_eq!(store.settings().near_hold_ms, 400);
        assert_eq!(store.settings().pocket.near_min_ms, 2500);
    }
}
