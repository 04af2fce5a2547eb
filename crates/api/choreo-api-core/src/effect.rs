//! In-flight effect handles.

/// Handle to one running leaf effect (a web animation, a class toggle, ...).
///
/// Sequencers hold these so a stop can cancel what is still in flight and a
/// degraded environment can jump straight to the end state. Both calls must
/// tolerate an effect that already finished on its own; that race is expected
/// and swallowed by implementations.
pub trait EffectHandle {
    /// Abort the effect, leaving the target wherever it currently is.
    fn cancel(&mut self);

    /// Jump the effect to its end state immediately.
    fn finish(&mut self);
}
