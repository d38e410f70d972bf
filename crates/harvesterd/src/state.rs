//! Shared daemon state: the latest report and the allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

/// Latest published report. Replaced whole; readers clone the inner `Arc`.
pub(crate) type SharedState = Arc<Mutex<Arc<Value>>>;

/// Slot holding an empty object until the first collection finishes.
pub(crate) fn new_state() -> SharedState {
    Arc::new(Mutex::new(Arc::new(Value::Object(Map::new()))))
}

pub(crate) fn current(state: &SharedState) -> Arc<Value> {
    let slot = state.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(&slot)
}

pub(crate) fn publish(state: &SharedState, report: Value) {
    let report = Arc::new(report);
    let mut slot = state.lock().unwrap_or_else(|e| e.into_inner());
    *slot = report;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slot_starts_empty_and_is_replaced() {
        let state = new_state();
        assert_eq!(*current(&state), json!({}));

        let before = current(&state);
        publish(&state, json!({"null": {"metadata": {}}}));
        assert_eq!(*before, json!({}));
        assert!(current(&state).get("null").is_some());
    }
}
