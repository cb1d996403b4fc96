//! Per-run instance result cache
//!
//! Gantree: L4_Engine → InstanceCache
//!
//! Every [`InstanceKey`] maps to one slot. The first caller to claim a key
//! owns its execution; later callers block on the slot until the owner
//! fulfils or abandons it. Cloning the cache shares the same slots.

use qknit_core::{Distribution, KnitError, KnitResult};
use qknit_cutting::InstanceKey;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug)]
enum SlotState {
    Pending,
    Ready(Arc<Distribution>),
    Failed(KnitError),
}

#[derive(Debug)]
struct Slot {
    state: Mutex<SlotState>,
    settled: Condvar,
}

impl Slot {
    fn pending() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            settled: Condvar::new(),
        }
    }

    fn settle(&self, state: SlotState) -> KnitResult<()> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        if matches!(*guard, SlotState::Pending) {
            *guard = state;
        }
        self.settled.notify_all();
        Ok(())
    }

    fn wait(&self) -> KnitResult<Arc<Distribution>> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        loop {
            match &*guard {
                SlotState::Ready(dist) => return Ok(Arc::clone(dist)),
                SlotState::Failed(err) => return Err(err.clone()),
                SlotState::Pending => {}
            }
            guard = self.settled.wait(guard).map_err(|_| poisoned())?;
        }
    }
}

fn poisoned() -> KnitError {
    KnitError::InternalError("instance cache lock poisoned".to_string())
}

/// Get-or-create cache of instance distributions
/// Gantree: InstanceCache // 인스턴스 캐시
#[derive(Debug, Clone, Default)]
pub struct InstanceCache {
    slots: Arc<Mutex<HashMap<InstanceKey, Arc<Slot>>>>,
}

impl InstanceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `key` if nobody has; `true` means the caller must
    /// fulfil or abandon it
    /// Gantree: claim(key) -> Result<bool> // 원자적 선점
    pub fn claim(&self, key: &InstanceKey) -> KnitResult<bool> {
        let mut slots = self.slots.lock().map_err(|_| poisoned())?;
        if slots.contains_key(key) {
            return Ok(false);
        }
        slots.insert(key.clone(), Arc::new(Slot::pending()));
        Ok(true)
    }

    fn slot(&self, key: &InstanceKey) -> KnitResult<Arc<Slot>> {
        let slots = self.slots.lock().map_err(|_| poisoned())?;
        slots.get(key).cloned().ok_or_else(|| {
            KnitError::InternalError(format!("instance {} was never claimed", key))
        })
    }

    /// Settle a claimed key with its execution outcome
    pub fn fulfil(&self, key: &InstanceKey, result: KnitResult<Distribution>) -> KnitResult<()> {
        let state = match result {
            Ok(dist) => SlotState::Ready(Arc::new(dist)),
            Err(err) => SlotState::Failed(err),
        };
        self.slot(key)?.settle(state)
    }

    /// Give up a claimed key before sending it; waiters see a
    /// never-attempted failure
    pub fn abandon(&self, key: &InstanceKey, reason: &str) -> KnitResult<()> {
        self.slot(key)?.settle(SlotState::Failed(KnitError::InstanceExecution {
            instance: key.to_string(),
            attempted: false,
            reason: reason.to_string(),
        }))
    }

    /// Block until `key` is settled
    /// Gantree: wait(key) -> Result<Arc<Distribution>> // 대기
    pub fn wait(&self, key: &InstanceKey) -> KnitResult<Arc<Distribution>> {
        self.slot(key)?.wait()
    }

    /// Distribution for `key` if it is ready now
    pub fn get(&self, key: &InstanceKey) -> Option<Arc<Distribution>> {
        let slot = self.slots.lock().ok()?.get(key).cloned()?;
        let state = slot.state.lock().ok()?;
        match &*state {
            SlotState::Ready(dist) => Some(Arc::clone(dist)),
            _ => None,
        }
    }

    /// Run `create` exactly once per key across all callers
    /// Gantree: get_or_create(key, f) -> Result<Arc<Distribution>> // 단일 실행
    pub fn get_or_create<F>(&self, key: &InstanceKey, create: F) -> KnitResult<Arc<Distribution>>
    where
        F: FnOnce() -> KnitResult<Distribution>,
    {
        if self.claim(key)? {
            self.fulfil(key, create())?;
        }
        self.wait(key)
    }

    /// Number of keys claimed so far
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Check if nothing has been claimed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot
    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use qknit_core::{Basis, PrepState};
    use qknit_cutting::StubSetting;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn key(fragment: usize) -> InstanceKey {
        InstanceKey {
            fragment,
            settings: vec![StubSetting::Measure(Basis::X)],
        }
    }

    #[test]
    fn test_claim_once() {
        let cache = InstanceCache::new();
        assert!(cache.claim(&key(0)).unwrap());
        assert!(!cache.claim(&key(0)).unwrap());
        assert!(cache.claim(&key(1)).unwrap());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0)).is_none());

        cache.fulfil(&key(0), Ok(Distribution::delta(1, 1))).unwrap();
        assert_eq!(cache.get(&key(0)).unwrap().get(1), 1.0);
    }

    #[test]
    fn test_wait_blocks_until_fulfilled() {
        let cache = InstanceCache::new();
        let k = key(0);
        assert!(cache.claim(&k).unwrap());

        let waiter = {
            let cache = cache.clone();
            let k = k.clone();
            thread::spawn(move || cache.wait(&k))
        };
        thread::sleep(Duration::from_millis(20));
        cache.fulfil(&k, Ok(Distribution::delta(1, 0))).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap().get(0), 1.0);
    }

    #[test]
    fn test_abandon_reports_never_attempted() {
        let cache = InstanceCache::new();
        let k = InstanceKey {
            fragment: 1,
            settings: vec![StubSetting::Prepare(PrepState::PlusI)],
        };
        cache.claim(&k).unwrap();
        cache.abandon(&k, "deadline exceeded").unwrap();
        match cache.wait(&k) {
            Err(KnitError::InstanceExecution {
                instance,
                attempted,
                ..
            }) => {
                assert_eq!(instance, "f1[+i]");
                assert!(!attempted);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_get_or_create_runs_once_under_contention() {
        let cache = InstanceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache.get_or_create(&key(3), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        Ok(Distribution::delta(2, 3))
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().get(3), 1.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear() {
        let cache = InstanceCache::new();
        cache.claim(&key(0)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.wait(&key(0)).is_err());
    }
}
