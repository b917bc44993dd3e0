//! Component state: `use_state`, `set_state`, `use_effect` and `alert`.
//!
//! State is keyed by name rather than call order, so a component can read
//! and write the same value from its render function and its handlers.

use rhai::{Dynamic, Engine, FnPtr, ImmutableString, FLOAT, INT};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
pub struct HookState {
    values: BTreeMap<String, Dynamic>,
    effects_run: HashSet<String>,
    pending_effects: Vec<(String, FnPtr)>,
    alerts: Vec<String>,
}

impl HookState {
    pub fn get(&self, key: &str) -> Option<&Dynamic> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Dynamic) {
        self.values.insert(key.to_string(), value.flatten());
    }

    /// Current value, seeding `initial` the first time a key is seen.
    pub fn use_state(&mut self, key: &str, initial: Dynamic) -> Dynamic {
        self.values
            .entry(key.to_string())
            .or_insert_with(|| initial.flatten())
            .clone()
    }

    /// Queue an effect unless it already ran or is already queued.
    pub fn use_effect(&mut self, key: &str, effect: FnPtr) {
        if self.effects_run.contains(key) || self.pending_effects.iter().any(|(k, _)| k == key) {
            return;
        }
        self.pending_effects.push((key.to_string(), effect));
    }

    /// Hand over the queued effects, marking them as run.
    pub fn take_pending_effects(&mut self) -> Vec<(String, FnPtr)> {
        let pending = std::mem::take(&mut self.pending_effects);
        for (key, _) in &pending {
            self.effects_run.insert(key.clone());
        }
        pending
    }

    pub fn push_alert(&mut self, message: String) {
        self.alerts.push(message);
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    /// Store text typed into a bound input, keeping the type the state had.
    pub fn set_input(&mut self, key: &str, text: &str) {
        let coerced = coerce_input(self.values.get(key), text);
        self.values.insert(key.to_string(), coerced);
    }
}

/// Integers stay integers and floats stay floats when the text parses;
/// anything else is stored as a string.
pub fn coerce_input(current: Option<&Dynamic>, text: &str) -> Dynamic {
    let trimmed = text.trim();
    match current {
        Some(v) if v.is::<INT>() => trimmed
            .parse::<INT>()
            .map(Dynamic::from)
            .or_else(|_| trimmed.parse::<FLOAT>().map(Dynamic::from))
            .unwrap_or_else(|_| Dynamic::from(text.to_string())),
        Some(v) if v.is::<FLOAT>() => trimmed
            .parse::<FLOAT>()
            .map(Dynamic::from)
            .unwrap_or_else(|_| Dynamic::from(text.to_string())),
        Some(v) if v.is::<bool>() => match trimmed {
            "true" => Dynamic::from(true),
            "false" => Dynamic::from(false),
            _ => Dynamic::from(text.to_string()),
        },
        _ => Dynamic::from(text.to_string()),
    }
}

pub(crate) fn lock(hooks: &Mutex<HookState>) -> std::sync::MutexGuard<'_, HookState> {
    hooks.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn register_hooks(engine: &mut Engine, hooks: Arc<Mutex<HookState>>) {
    let state = hooks.clone();
    engine.register_fn("use_state", move |key: ImmutableString, initial: Dynamic| {
        lock(&state).use_state(&key, initial)
    });

    let state = hooks.clone();
    engine.register_fn("set_state", move |key: ImmutableString, value: Dynamic| {
        lock(&state).set(&key, value);
    });

    let state = hooks.clone();
    engine.register_fn("use_effect", move |key: ImmutableString, effect: FnPtr| {
        lock(&state).use_effect(&key, effect);
    });

    let state = hooks;
    engine.register_fn("alert", move |message: Dynamic| {
        let message = message.flatten().to_string();
        debug!(%message, "Component alert");
        lock(&state).push_alert(message);
    });
}
