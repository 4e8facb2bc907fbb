use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::markers::MarkerKind;
use crate::host::ActorId;

static EFFECT_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_effect_lock_poison_once(operation: &'static str) {
    if EFFECT_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "effect lock poisoned; recovered inner value");
    }
}

type LockKey = (ActorId, MarkerKind);

/// Short-lived `actor + marker kind` locks guarding marker creation.
#[derive(Clone, Debug, Default)]
pub struct EffectLocks {
    held: Arc<Mutex<HashSet<LockKey>>>,
}

impl EffectLocks {
    /// `None` while another add for the same actor and kind is in progress.
    pub fn try_acquire(&self, actor: ActorId, kind: MarkerKind) -> Option<EffectLockGuard> {
        let inserted = self.lock_set("acquire").insert((actor, kind));
        inserted.then(|| EffectLockGuard {
            held: Arc::clone(&self.held),
            key: (actor, kind),
        })
    }

    pub fn is_locked(&self, actor: ActorId, kind: MarkerKind) -> bool {
        self.lock_set("inspect").contains(&(actor, kind))
    }

    pub fn held_count(&self) -> usize {
        self.lock_set("inspect").len()
    }

    fn lock_set(&self, operation: &'static str) -> MutexGuard<'_, HashSet<LockKey>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_effect_lock_poison_once(operation);
                poisoned.into_inner()
            }
        }
    }
}

/// Releases its lock on drop, whichever way the holder exits.
#[derive(Debug)]
pub struct EffectLockGuard {
    held: Arc<Mutex<HashSet<LockKey>>>,
    key: LockKey,
}

impl Drop for EffectLockGuard {
    fn drop(&mut self) {
        let mut set = match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_effect_lock_poison_once("release");
                poisoned.into_inner()
            }
        };
        set.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let locks = EffectLocks::default();
        let guard = locks
            .try_acquire(ActorId(1), MarkerKind::Dim)
            .expect("first acquire");
        assert!(locks.try_acquire(ActorId(1), MarkerKind::Dim).is_none());
        assert!(locks.try_acquire(ActorId(1), MarkerKind::Dark).is_some());
        assert!(locks.try_acquire(ActorId(2), MarkerKind::Dim).is_some());

        drop(guard);
        assert!(!locks.is_locked(ActorId(1), MarkerKind::Dim));
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn lock_released_on_early_error_return() {
        fn failing_add(locks: &EffectLocks) -> Result<(), &'static str> {
            let _guard = locks
                .try_acquire(ActorId(5), MarkerKind::Dark)
                .ok_or("held")?;
            Err("write failed")
        }

        let locks = EffectLocks::default();
        assert_eq!(failing_add(&locks), Err("write failed"));
        assert!(!locks.is_locked(ActorId(5), MarkerKind::Dark));
    }

    #[test]
    fn poisoned_lock_set_is_recovered() {
        let locks = EffectLocks::default();
        let shared = locks.clone();
        let _ = thread::spawn(move || {
            let _set = shared.held.lock().expect("lock set");
            panic!("poison effect locks");
        })
        .join();

        let guard = locks
            .try_acquire(ActorId(3), MarkerKind::Dim)
            .expect("acquire after poison");
        assert!(locks.is_locked(ActorId(3), MarkerKind::Dim));
        drop(guard);
        assert!(!locks.is_locked(ActorId(3), MarkerKind::Dim));
    }
}
