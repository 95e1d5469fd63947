use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

// TbObj lets test objects (scoreboards, recorders, models) be shared between
// tasks. The simulation runs on a single thread, so the lock is never
// contended; it only exists so the tasks stay Send.
pub struct TbObj<T>(Arc<Mutex<T>>);

impl<T> TbObj<T> {
    pub fn new(data: T) -> TbObj<T> {
        TbObj(Arc::new(Mutex::new(data)))
    }

    pub fn get(&self) -> MutexGuard<'_, T> {
        // a poisoned lock means a task panicked while holding it; the data is
        // still the best record of what happened
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }
}

impl<T> Clone for TbObj<T> {
    fn clone(&self) -> Self {
        TbObj(self.0.clone())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for TbObj<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TbObj").field(&*self.get()).finish()
    }
}

/// Written once by whoever ends the active phase, read by everyone else.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
