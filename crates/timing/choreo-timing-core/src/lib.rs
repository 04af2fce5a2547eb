//! choreo-timing-core: the shared timing substrate.
//!
//! One coalesced per-frame clock drives every time-based piece of the engine:
//! independent pause/resume timers, the stagger sequencer and the multi-phase
//! timeline sequencer all share a single underlying frame request so that
//! N logical consumers never cost N host callbacks.

pub mod clock;
pub mod interval;
pub mod stagger;
pub mod timeline;
pub mod timer;

pub use clock::{SharedClock, SubscriptionId};
pub use interval::{IntervalDriver, ManualScheduler, FALLBACK_FRAME_MS};
pub use stagger::{compute_delays, GridMetric, GridSpec, StaggerOrigin, StaggerRun, StaggerSpec};
pub use timeline::{PhaseSpec, TimelineDelegate, TimelineRun, TimelineSpec, PROGRESS_STEP};
pub use timer::{FrameTimer, TimerOptions, TimerTick};
