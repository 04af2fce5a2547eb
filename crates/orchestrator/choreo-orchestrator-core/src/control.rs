//! Orchestration control requests.
//!
//! Modules never call into the session directly; they enqueue requests
//! through a cloneable handle the session seeded into the exchange, and the
//! session drains the queue with its arbitration rules applied. This keeps
//! the session the single writer of the playing/paused flags.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Who asked for a lifecycle transition. Automatic origins (visibility,
/// scroll triggers, document visibility) are subject to manual-override
/// arbitration; manual origins set the override.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Manual,
    Auto,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlRequest {
    Play(Origin),
    Pause,
    Stop(Origin),
    Resume,
}

/// Cloneable enqueue-only handle to a session's control queue.
#[derive(Clone, Debug, Default)]
pub struct ControlHandle {
    queue: Rc<RefCell<VecDeque<ControlRequest>>>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&self, origin: Origin) {
        self.push(ControlRequest::Play(origin));
    }

    pub fn pause(&self) {
        self.push(ControlRequest::Pause);
    }

    pub fn stop(&self, origin: Origin) {
        self.push(ControlRequest::Stop(origin));
    }

    pub fn resume(&self) {
        self.push(ControlRequest::Resume);
    }

    pub fn push(&self, request: ControlRequest) {
        self.queue.borrow_mut().push_back(request);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Take everything queued so far, in arrival order.
    pub(crate) fn drain(&self) -> Vec<ControlRequest> {
        self.queue.borrow_mut().drain(..).collect()
    }
}
