//! Host collaborator contracts.
//!
//! The engine consumes these traits without knowing how they are implemented:
//! a browser adapter backs them with rAF/IntersectionObserver/CSS custom
//! properties, a native host with whatever it has, tests with fakes.

use crate::target::TargetRef;

/// Teardown closure returned by watcher/observer registrations.
pub type Unsubscribe = Box<dyn FnOnce()>;

/// Per-frame scheduling collaborator.
///
/// The engine expresses *demand* through this trait; the host delivers the
/// actual tick (with a monotonically non-decreasing millisecond timestamp,
/// comparable across calls within one session's life) back into the clock.
pub trait FrameScheduler {
    /// Ask the host for one frame callback. Returns a handle usable with
    /// [`cancel_frame`](Self::cancel_frame).
    fn request_frame(&mut self) -> u64;

    /// Cancel a previously requested frame. Cancelling a handle that already
    /// fired is an expected race and must be a no-op.
    fn cancel_frame(&mut self, handle: u64);
}

/// One visibility report for an observed target.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VisibilityEvent {
    pub visible: bool,
    /// Fraction of the target inside the viewport, in `[0, 1]`.
    pub ratio: f64,
}

/// Visibility/size observation collaborator.
///
/// Implementations must coalesce multiple observers of the same target into
/// one underlying sensor and stop that sensor once its last consumer
/// unsubscribes; the engine relies on the returned closure for teardown and
/// never re-checks.
pub trait VisibilityObserver {
    fn observe(
        &self,
        target: &TargetRef,
        threshold: f64,
        callback: Box<dyn FnMut(VisibilityEvent)>,
    ) -> Unsubscribe;
}

/// Scoped variable accessor (CSS custom properties or any named-style analog).
///
/// Values are opaque to the engine; it only forwards them for cross-module
/// styling coordination.
pub trait VarScope {
    fn set_var(&self, name: &str, value: &str);
    fn get_var(&self, name: &str) -> Option<String>;
}
