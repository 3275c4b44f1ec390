//! Key Rotator: round-robin dispensation over a fixed pool of provider keys.
//!
//! Each key is either active or failed. Within one cycle no active key is
//! handed out twice before every other active key has been handed out once.
//! When a cycle is spent (or every key has failed) the rotator performs a
//! full reset: failures are forgotten and dispensation restarts at the first
//! pool key. Recovery is round-based, not time-based.
//!
//! One rotator is shared by every in-flight request (`Arc<KeyRotator>`); the
//! mutable state sits behind a mutex that is only held for the duration of a
//! single call.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::recommendation::error::RecommendError;

#[derive(Debug, Default)]
struct RotationState {
    cursor: usize,
    failed: HashSet<usize>,
    used_this_cycle: HashSet<usize>,
}

impl RotationState {
    fn full_reset(&mut self) {
        self.failed.clear();
        self.used_this_cycle.clear();
        self.cursor = 0;
    }
}

/// Snapshot of pool health. Never contains key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPoolStatus {
    pub pool_size: usize,
    pub active_keys: usize,
    pub has_available_keys: bool,
}

#[derive(Debug)]
pub struct KeyRotator {
    keys: Vec<String>,
    state: Mutex<RotationState>,
}

impl KeyRotator {
    /// Builds a rotator over `keys`. Blank entries are dropped and duplicates
    /// collapse onto their first occurrence; an empty pool is rejected.
    pub fn new<I, S>(keys: I) -> Result<Self, RecommendError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| {
                let k: String = k.into();
                k.trim().to_string()
            })
            .filter(|k| !k.is_empty())
            .filter(|k| seen.insert(k.clone()))
            .collect();

        if keys.is_empty() {
            return Err(RecommendError::Configuration(
                "at least one API key is required".to_string(),
            ));
        }

        info!("Key rotator initialized with {} key(s)", keys.len());

        Ok(Self {
            keys,
            state: Mutex::new(RotationState::default()),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.keys.len()
    }

    /// Returns the next usable key and marks it used for the current cycle.
    pub fn get_next_key(&self) -> Result<String, RecommendError> {
        let mut state = self.lock();
        let len = self.keys.len();

        let active_count = len - state.failed.len();
        if active_count == 0 {
            if len == 1 {
                return Err(RecommendError::AllKeysExhausted);
            }
            warn!("Every key has failed, resetting rotation");
            return Ok(self.restart_cycle(&mut state));
        }

        let has_unused = (0..len)
            .any(|i| !state.failed.contains(&i) && !state.used_this_cycle.contains(&i));
        if !has_unused {
            debug!("Rotation cycle complete, starting a new one");
            return Ok(self.restart_cycle(&mut state));
        }

        for offset in 0..len {
            let index = (state.cursor + offset) % len;
            if state.failed.contains(&index) || state.used_this_cycle.contains(&index) {
                continue;
            }
            state.used_this_cycle.insert(index);
            state.cursor = (index + 1) % len;
            return Ok(self.keys[index].clone());
        }

        // Unreachable while `has_unused` holds.
        Ok(self.restart_cycle(&mut state))
    }

    /// Marks `key` as failed and drops it from the current cycle. Repeat calls
    /// are no-ops; keys outside the pool are ignored.
    pub fn mark_key_failed(&self, key: &str) {
        let Some(index) = self.keys.iter().position(|k| k == key) else {
            warn!("Ignoring failure report for key outside the pool: {}", mask_key(key));
            return;
        };

        let mut state = self.lock();
        state.used_this_cycle.remove(&index);
        if state.failed.insert(index) {
            warn!(
                "Key {} marked failed ({} of {} still active)",
                mask_key(key),
                self.keys.len() - state.failed.len(),
                self.keys.len()
            );
        }
    }

    pub fn active_key_count(&self) -> usize {
        self.keys.len() - self.lock().failed.len()
    }

    pub fn has_available_keys(&self) -> bool {
        self.active_key_count() > 0
    }

    /// Explicitly reactivates every key and restarts rotation at the first key.
    pub fn reactivate_all(&self) {
        self.lock().full_reset();
        info!("All {} key(s) reactivated", self.keys.len());
    }

    pub fn status(&self) -> KeyPoolStatus {
        let active_keys = self.active_key_count();
        KeyPoolStatus {
            pool_size: self.keys.len(),
            active_keys,
            has_available_keys: active_keys > 0,
        }
    }

    fn restart_cycle(&self, state: &mut RotationState) -> String {
        state.full_reset();
        state.used_this_cycle.insert(0);
        state.cursor = 1 % self.keys.len();
        self.keys[0].clone()
    }

    // Poisoning is ignored: every mutation leaves the state consistent.
    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Renders a key for logs: first four and last four characters only.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
