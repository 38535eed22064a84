//! Last observed value per field

use crate::field::Field;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Field values as last reported by the device.
///
/// Only the response-processing path writes here, in stream arrival order.
#[derive(Debug, Default)]
pub struct StateCache {
    values: Mutex<HashMap<Field, String>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed value, returns true if the cached value changed
    pub(crate) fn update(&self, field: Field, value: &str) -> bool {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if values.get(&field).map(String::as_str) == Some(value) {
            return false;
        }
        info!("Updating value of {} to {}", field, value);
        values.insert(field, value.to_string());
        true
    }

    pub fn get(&self, field: Field) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&field)
            .cloned()
    }

    /// Copy of all known values in field ordinal order
    pub fn snapshot(&self) -> Vec<(Field, String)> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Field::ALL
            .iter()
            .filter_map(|field| values.get(field).map(|value| (*field, value.clone())))
            .collect()
    }
}
