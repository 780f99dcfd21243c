// Licensed under the Apache-2.0 license

//! Suspend/resume primitives for callers of the I2C controller.

use crate::i2c::common::Wakeup;
use crate::i2c::traits::{ResumeToken, ThreadSuspension};
use alloc::sync::Arc;
use core::convert::Infallible;
use core::sync::atomic::{AtomicU8, Ordering};

const NOT_RESUMED: u8 = 0;

/// Busy-waiting suspension for contexts without a scheduler to park on.
///
/// Every [`prepare`](ThreadSuspension::prepare) creates a new cell, so a
/// token left over from an earlier suspension writes into a cell nobody
/// reads anymore.
pub struct SpinSuspension {
    cell: Arc<AtomicU8>,
}

pub struct SpinToken {
    cell: Arc<AtomicU8>,
}

impl ResumeToken for SpinToken {
    fn resume(self, msg: Wakeup) {
        self.cell.store(msg as u8, Ordering::Release);
    }
}

impl Default for SpinSuspension {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinSuspension {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: Arc::new(AtomicU8::new(NOT_RESUMED)),
        }
    }

    /// Non-blocking check for the message of the current token.
    pub fn poll(&self) -> nb::Result<Wakeup, Infallible> {
        match Wakeup::from_raw(self.cell.load(Ordering::Acquire)) {
            Some(msg) => Ok(msg),
            None => {
                core::hint::spin_loop();
                Err(nb::Error::WouldBlock)
            }
        }
    }
}

impl ThreadSuspension for SpinSuspension {
    type Token = SpinToken;

    fn prepare(&mut self) -> SpinToken {
        self.cell = Arc::new(AtomicU8::new(NOT_RESUMED));
        SpinToken {
            cell: Arc::clone(&self.cell),
        }
    }

    fn suspend(&mut self) -> Wakeup {
        match nb::block!(self.poll()) {
            Ok(msg) => msg,
            Err(never) => match never {},
        }
    }
}

#[cfg(feature = "std")]
pub use blocking::{BlockingSuspension, BlockingToken};

#[cfg(feature = "std")]
mod blocking {
    use crate::i2c::common::Wakeup;
    use crate::i2c::traits::{ResumeToken, ThreadSuspension};
    use crate::i2c::transaction::protocol_violation;
    use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

    /// Parks the calling thread on a one-slot channel.
    #[derive(Default)]
    pub struct BlockingSuspension {
        waiting: Option<Receiver<Wakeup>>,
    }

    pub struct BlockingToken {
        resume: SyncSender<Wakeup>,
    }

    impl ResumeToken for BlockingToken {
        fn resume(self, msg: Wakeup) {
            // The slot holds exactly one message and this is the only send.
            // A closed channel means the waiter was re-prepared.
            let _ = self.resume.try_send(msg);
        }
    }

    impl BlockingSuspension {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ThreadSuspension for BlockingSuspension {
        type Token = BlockingToken;

        fn prepare(&mut self) -> BlockingToken {
            let (resume, waiting) = sync_channel(1);
            self.waiting = Some(waiting);
            BlockingToken { resume }
        }

        fn suspend(&mut self) -> Wakeup {
            let Some(waiting) = self.waiting.take() else {
                protocol_violation("suspend without a prepared token");
            };
            waiting
                .recv()
                .unwrap_or_else(|_| protocol_violation("token dropped without resuming"))
        }
    }
}
