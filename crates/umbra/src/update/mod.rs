mod locks;
mod markers;
mod reconciler;
mod scheduler;

pub use locks::{EffectLockGuard, EffectLocks};
pub use markers::{
    sink_for_style, ActiveEffectSink, EffectSink, MarkerKind, StatusIconSink, MARKER_ORIGIN,
};
pub use reconciler::{
    ApplyOutcome, DrainReport, EffectReconciler, LevelChange, PendingOperation, ReconcileError,
};
pub use scheduler::{CircuitBreaker, UpdateScheduler};
