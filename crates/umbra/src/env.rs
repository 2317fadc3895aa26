use std::sync::{Arc, Mutex};

use crate::value::Value;

/// One environment frame: a fixed-capacity array of value slots plus an
/// optional link to the enclosing frame.
///
/// Slots are interior-mutable because the evaluator fills them in after the
/// frame has been linked into scope (recursive bindings require it). A slot
/// is either empty, holds a value, or holds [`Value::BlackHole`] while the
/// evaluator is forcing it; hashing treats the latter two states of
/// emptiness uniformly as "absent".
pub struct Env {
    up: Option<Arc<Env>>,
    size: usize,
    slots: Mutex<Vec<Option<Value>>>,
}

impl Env {
    pub fn new(up: Option<Arc<Env>>, size: usize) -> Self {
        Self {
            up,
            size,
            slots: Mutex::new(vec![None; size]),
        }
    }

    pub fn up(&self) -> Option<&Arc<Env>> {
        self.up.as_ref()
    }

    /// Recorded slot count. Callers hashing a frame without better
    /// information use this.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set(&self, index: usize, value: Value) {
        if let Ok(mut slots) = self.slots.lock() {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(value);
            }
        }
    }

    pub fn clear_slot(&self, index: usize) {
        if let Ok(mut slots) = self.slots.lock() {
            if let Some(slot) = slots.get_mut(index) {
                *slot = None;
            }
        }
    }

    pub fn slot(&self, index: usize) -> Option<Value> {
        if let Ok(slots) = self.slots.lock() {
            if let Some(slot) = slots.get(index) {
                return slot.clone();
            }
        }
        None
    }
}
