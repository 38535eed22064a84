//! Persistent and one-shot field listeners
//!
//! Both registries are guarded by their own locks, independent of the
//! transport. Dispatch copies (persistent) or takes (one-shot) the callbacks
//! of a field under the lock and invokes them after releasing it, so
//! callbacks may register or remove listeners freely.

use crate::field::Field;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Callback invoked with a field and the value just received for it.
///
/// Identity is the `Arc` allocation: clone the same `Listener` to register
/// it under several fields, and pass any clone to remove it everywhere.
pub type Listener = Arc<dyn Fn(Field, &str) + Send + Sync>;

type Buckets = HashMap<Field, Vec<Listener>>;

#[derive(Default)]
pub struct ListenerRegistry {
    persistent: Mutex<Buckets>,
    one_shot: Mutex<Buckets>,
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener that fires on every value received for `field`
    pub fn add(&self, field: Field, listener: &Listener) {
        debug!("Registering listener for event key '{}'", field);
        self.persistent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(field)
            .or_default()
            .push(Arc::clone(listener));
    }

    /// Register a listener that fires on the next value received for `field`
    pub fn add_one_shot(&self, field: Field, listener: &Listener) {
        debug!("Registering one-time listener for event key '{}'", field);
        self.one_shot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(field)
            .or_default()
            .push(Arc::clone(listener));
    }

    /// Remove every registration of `listener`, persistent and one-shot
    pub fn remove(&self, listener: &Listener) {
        for registry in [&self.one_shot, &self.persistent] {
            let mut buckets = registry.lock().unwrap_or_else(PoisonError::into_inner);
            for bucket in buckets.values_mut() {
                bucket.retain(|registered| !same_listener(registered, listener));
            }
            buckets.retain(|_, bucket| !bucket.is_empty());
        }
    }

    /// Number of registrations for `field` as (persistent, one-shot)
    pub fn count(&self, field: Field) -> (usize, usize) {
        let count = |registry: &Mutex<Buckets>| {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&field)
                .map_or(0, Vec::len)
        };
        (count(&self.persistent), count(&self.one_shot))
    }

    /// Notify listeners of an observed value, one-shot listeners first
    pub fn dispatch(&self, field: Field, value: &str) {
        let one_shot = self
            .one_shot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&field)
            .unwrap_or_default();
        for listener in &one_shot {
            invoke(listener, field, value);
        }

        let persistent = self
            .persistent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&field)
            .cloned()
            .unwrap_or_default();
        for listener in &persistent {
            invoke(listener, field, value);
        }
    }
}

fn invoke(listener: &Listener, field: Field, value: &str) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener(field, value))) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Listener for {} failed: {}", field, reason);
    }
}
