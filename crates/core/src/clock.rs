//! Time sources that can be injected into time-sensitive modules.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A monotonic time source.
pub trait Clock: 'static + Send + Sync + std::fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Trait-object [Clock].
pub type DynClock = Arc<dyn Clock>;

/// The system monotonic clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Construct a new SystemClock.
    pub fn create() -> DynClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug)]
pub struct ManualClock(Mutex<Instant>);

impl Default for ManualClock {
    fn default() -> Self {
        Self(Mutex::new(Instant::now()))
    }
}

impl ManualClock {
    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.0.lock().expect("ManualClock inner Mutex is poisoned") += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().expect("ManualClock inner Mutex is poisoned")
    }
}
