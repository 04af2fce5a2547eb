//! Reference-counted shared state, scoped to whoever owns the registry.
//!
//! Sessions (or modules) acquire a named slot; the first acquisition runs the
//! initializer, later ones reuse the stored value. Release decrements the
//! count and deletes the slot synchronously at zero — the next acquire
//! re-initializes from scratch.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::context::ExchangeValue;

#[derive(Clone, Default)]
pub struct SharedStateRegistry {
    inner: Rc<RefCell<HashMap<String, (ExchangeValue, usize)>>>,
}

impl SharedStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the named slot, initializing it on first acquisition.
    pub fn acquire(
        &self,
        name: impl Into<String>,
        init: impl FnOnce() -> ExchangeValue,
    ) -> ExchangeValue {
        let mut slots = self.inner.borrow_mut();
        let entry = slots
            .entry(name.into())
            .and_modify(|(_, count)| *count += 1)
            .or_insert_with(|| (init(), 1));
        entry.0.clone()
    }

    /// Drop one reference. The slot is removed the moment the count hits
    /// zero; releasing an unknown name is a no-op.
    pub fn release(&self, name: &str) {
        let mut slots = self.inner.borrow_mut();
        if let Some((_, count)) = slots.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                slots.remove(name);
            }
        }
    }

    pub fn ref_count(&self, name: &str) -> usize {
        self.inner.borrow().get(name).map_or(0, |(_, c)| *c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.borrow().contains_key(name)
    }
}
