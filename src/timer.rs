// Licensed under the Apache-2.0 license

//! Deadline timers for the I2C transaction engine.
//!
//! [`VirtualTimer`] counts down in software and is driven by whatever tick
//! source the system has (a periodic interrupt, a test). [`ThreadTimer`] is
//! the host implementation and waits out each deadline on a helper thread.

use crate::i2c::traits::DeadlineTimer;
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::cell::RefCell;
use critical_section::Mutex;
use fugit::MillisDurationU32;

struct Alarm {
    remaining: u32,
    on_fire: Box<dyn FnOnce() + Send>,
}

/// Tick-driven one-shot timer.
///
/// Clones share the same alarm, so one clone can be handed to the controller
/// and another to the tick source.
#[derive(Clone)]
pub struct VirtualTimer {
    alarm: Arc<Mutex<RefCell<Option<Alarm>>>>,
}

impl Default for VirtualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            alarm: Arc::new(Mutex::new(RefCell::new(None))),
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        critical_section::with(|cs| self.alarm.borrow_ref(cs).is_some())
    }

    /// Moves time forward by `elapsed` and fires the alarm if it is due.
    /// Returns `true` if it fired.
    pub fn advance(&self, elapsed: MillisDurationU32) -> bool {
        let due = critical_section::with(|cs| {
            let mut slot = self.alarm.borrow_ref_mut(cs);
            let expired = match slot.as_mut() {
                Some(alarm) if alarm.remaining > elapsed.ticks() => {
                    alarm.remaining -= elapsed.ticks();
                    false
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                slot.take()
            } else {
                None
            }
        });
        // The callback resolves the pending slot, which takes its own
        // critical section.
        match due {
            Some(alarm) => {
                (alarm.on_fire)();
                true
            }
            None => false,
        }
    }
}

impl DeadlineTimer for VirtualTimer {
    fn arm<F>(&mut self, interval: MillisDurationU32, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let alarm = Alarm {
            remaining: interval.ticks(),
            on_fire: Box::new(on_fire),
        };
        critical_section::with(|cs| {
            self.alarm.borrow_ref_mut(cs).replace(alarm);
        });
    }

    fn disarm(&mut self) -> bool {
        critical_section::with(|cs| self.alarm.borrow_ref_mut(cs).take().is_some())
    }
}

#[cfg(feature = "std")]
pub use thread_timer::ThreadTimer;

#[cfg(feature = "std")]
mod thread_timer {
    use crate::i2c::traits::DeadlineTimer;
    use fugit::MillisDurationU32;
    use std::sync::{Arc, Condvar, Mutex, PoisonError};
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Copy, Clone, PartialEq, Eq)]
    enum AlarmState {
        Armed,
        Disarmed,
        Fired,
    }

    struct Alarm {
        state: Mutex<AlarmState>,
        wake: Condvar,
    }

    impl Alarm {
        /// Moves an armed alarm to `next`. Returns `false` if it already left
        /// the armed state.
        fn leave_armed(&self, next: AlarmState) -> bool {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != AlarmState::Armed {
                return false;
            }
            *state = next;
            self.wake.notify_all();
            true
        }
    }

    /// Host timer: every arm gets a helper thread that sleeps until the
    /// deadline or until it is disarmed.
    #[derive(Default)]
    pub struct ThreadTimer {
        current: Option<Arc<Alarm>>,
    }

    impl ThreadTimer {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DeadlineTimer for ThreadTimer {
        fn arm<F>(&mut self, interval: MillisDurationU32, on_fire: F)
        where
            F: FnOnce() + Send + 'static,
        {
            let _ = self.disarm();

            let alarm = Arc::new(Alarm {
                state: Mutex::new(AlarmState::Armed),
                wake: Condvar::new(),
            });
            let deadline = Instant::now() + Duration::from_millis(u64::from(interval.ticks()));
            let waiter = Arc::clone(&alarm);
            thread::spawn(move || {
                let mut state = waiter.state.lock().unwrap_or_else(PoisonError::into_inner);
                while *state == AlarmState::Armed {
                    let now = Instant::now();
                    if now >= deadline {
                        *state = AlarmState::Fired;
                        break;
                    }
                    state = waiter
                        .wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                let fired = *state == AlarmState::Fired;
                drop(state);
                if fired {
                    on_fire();
                }
            });
            self.current = Some(alarm);
        }

        fn disarm(&mut self) -> bool {
            match self.current.take() {
                Some(alarm) => alarm.leave_armed(AlarmState::Disarmed),
                None => false,
            }
        }
    }

    impl Drop for ThreadTimer {
        fn drop(&mut self) {
            let _ = self.disarm();
        }
    }
}
