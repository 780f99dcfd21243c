// Licensed under the Apache-2.0 license

//! Pending-slot bookkeeping shared between the caller, the deadline timer and
//! the transport.
//!
//! A transaction opens the slot, and exactly one of the timeout path or the
//! completion path resolves it. Resolution takes the waiter's token out of the
//! slot under the critical section, so whichever path comes second finds
//! nothing to resume and does nothing. Every transaction has its own id so a
//! late timer or a late completion cannot reach a newer transaction.

use crate::i2c::buffer::TransferBuffer;
use crate::i2c::common::{BusErrors, Error, Wakeup};
use crate::i2c::traits::ResumeToken;
use alloc::sync::Arc;
use core::cell::RefCell;
use critical_section::Mutex;

/// Halts on a broken slot invariant. Continuing would mean resuming a
/// context twice or never.
#[cold]
pub(crate) fn protocol_violation(what: &'static str) -> ! {
    panic!("i2c protocol violation: {what}")
}

/// How the data phase ended, as reported to the slot.
pub(crate) enum Outcome<'a> {
    /// Received bytes arrived.
    Data(&'a [u8]),
    /// Nothing to receive; the write went out.
    Done,
    /// The transport reported errors.
    Failed(BusErrors),
    /// The deadline elapsed.
    Expired,
}

pub(crate) enum Slot<K> {
    Empty,
    Pending { id: u32, waiter: Option<K> },
    Resolved { id: u32, msg: Wakeup },
}

pub(crate) struct Inner<K, const N: usize> {
    pub(crate) buffer: TransferBuffer<N>,
    pub(crate) errors: BusErrors,
    slot: Slot<K>,
    next_id: u32,
}

impl<K: ResumeToken, const N: usize> Inner<K, N> {
    /// Stages the buffers and opens the slot for a new transaction.
    pub(crate) fn open(&mut self, tx: &[u8], rx_len: usize) -> Result<u32, Error> {
        if !matches!(self.slot, Slot::Empty) {
            protocol_violation("transaction opened while another is in flight");
        }
        self.buffer.stage_tx(tx)?;
        self.buffer.stage_rx(rx_len)?;
        self.errors = BusErrors::NONE;

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.slot = Slot::Pending { id, waiter: None };
        Ok(id)
    }

    /// Either returns the result that already arrived, or leaves `token` in
    /// the slot for the resolving path to consume.
    pub(crate) fn park(&mut self, id: u32, token: K) -> Option<Wakeup> {
        match &mut self.slot {
            Slot::Resolved { id: resolved, msg } if *resolved == id => Some(*msg),
            Slot::Pending { id: pending, waiter } if *pending == id => {
                if waiter.is_some() {
                    protocol_violation("second waiter registered on one slot");
                }
                *waiter = Some(token);
                None
            }
            _ => protocol_violation("waiting on a slot that belongs to nobody"),
        }
    }

    /// Empties the slot once the caller has its result.
    pub(crate) fn close(&mut self, id: u32) {
        if !matches!(self.slot, Slot::Resolved { id: resolved, .. } if resolved == id) {
            protocol_violation("closing a slot that was never resolved");
        }
        self.slot = Slot::Empty;
    }

    #[must_use]
    pub(crate) fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Empty)
    }

    fn settle(&mut self, outcome: Outcome<'_>) -> Wakeup {
        match outcome {
            Outcome::Data(bytes) => {
                if self.buffer.fill_rx(bytes) {
                    Wakeup::Ok
                } else {
                    self.errors |= BusErrors::BUS_ERROR;
                    Wakeup::Reset
                }
            }
            Outcome::Done => Wakeup::Ok,
            Outcome::Failed(errors) => {
                // A failure without a reason is still a failure.
                self.errors |= if errors.is_empty() {
                    BusErrors::BUS_ERROR
                } else {
                    errors
                };
                Wakeup::Reset
            }
            Outcome::Expired => Wakeup::Timeout,
        }
    }
}

/// State shared by a controller with its timer callback and completions.
pub(crate) struct Shared<K, const N: usize> {
    state: Mutex<RefCell<Inner<K, N>>>,
}

impl<K: ResumeToken, const N: usize> Shared<K, N> {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(Inner {
                buffer: TransferBuffer::new(),
                errors: BusErrors::NONE,
                slot: Slot::Empty,
                next_id: 1,
            })),
        }
    }

    /// Runs `f` inside the critical section.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Inner<K, N>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }
}

/// Resolution entry point reachable from the timer and the transport.
pub(crate) trait Resolver: Send + Sync {
    /// Resolves transaction `id`. Returns `false` when the slot no longer
    /// belongs to it (already resolved, closed or superseded).
    fn resolve(&self, id: u32, outcome: Outcome<'_>) -> bool;
}

impl<K: ResumeToken, const N: usize> Resolver for Shared<K, N> {
    fn resolve(&self, id: u32, outcome: Outcome<'_>) -> bool {
        let resolved = self.with(|inner| {
            let waiter = match &mut inner.slot {
                Slot::Pending { id: pending, waiter } if *pending == id => waiter.take(),
                _ => return None,
            };
            let msg = inner.settle(outcome);
            inner.slot = Slot::Resolved { id, msg };
            Some((waiter, msg))
        });

        match resolved {
            Some((Some(token), msg)) => {
                token.resume(msg);
                true
            }
            Some((None, _)) => true,
            None => false,
        }
    }
}

/// One-shot handle through which a transport finishes a read.
///
/// Consuming methods make a completion usable once. Dropping it unused
/// leaves the transaction to its deadline, as if the bus had stalled.
pub struct Completion {
    target: Arc<dyn Resolver>,
    id: u32,
}

impl Completion {
    pub(crate) fn new(target: Arc<dyn Resolver>, id: u32) -> Self {
        Self { target, id }
    }

    /// Delivers the received bytes. Returns `false` if the transaction was
    /// already resolved, typically by its deadline.
    pub fn deliver(self, bytes: &[u8]) -> bool {
        self.target.resolve(self.id, Outcome::Data(bytes))
    }

    /// Ends the transfer with bus errors.
    pub fn fail(self, errors: BusErrors) -> bool {
        self.target.resolve(self.id, Outcome::Failed(errors))
    }

    /// Ends the transfer with the flags matching a transport error.
    pub fn fail_with<E: embedded_io::Error>(self, error: &E) -> bool {
        self.fail(BusErrors::from_io_kind(error.kind()))
    }

    pub(crate) fn finish(self) -> bool {
        self.target.resolve(self.id, Outcome::Done)
    }

    pub(crate) fn expire(self) -> bool {
        self.target.resolve(self.id, Outcome::Expired)
    }
}

impl core::fmt::Debug for Completion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Completion").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec;

    /// Records every resume so double resumes would be visible.
    struct RecordingToken(Arc<StdMutex<Vec<Wakeup>>>);

    impl ResumeToken for RecordingToken {
        fn resume(self, msg: Wakeup) {
            self.0.lock().unwrap().push(msg);
        }
    }

    fn shared() -> Arc<Shared<RecordingToken, 8>> {
        let shared = Arc::new(Shared::new());
        shared.with(|inner| inner.buffer.allocate()).unwrap();
        shared
    }

    fn completion(shared: &Arc<Shared<RecordingToken, 8>>, id: u32) -> Completion {
        let target: Arc<dyn Resolver> = shared.clone();
        Completion::new(target, id)
    }

    #[test]
    fn test_resolution_before_park_skips_suspension() {
        let shared = shared();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let id = shared.with(|inner| inner.open(&[1], 2)).unwrap();

        assert!(completion(&shared, id).deliver(&[7, 8]));
        let early = shared.with(|inner| inner.park(id, RecordingToken(log.clone())));
        assert_eq!(early, Some(Wakeup::Ok));
        assert!(log.lock().unwrap().is_empty());

        shared.with(|inner| inner.close(id));
        assert!(shared.with(|inner| inner.is_idle()));
        assert_eq!(shared.with(|inner| inner.buffer.rx().map(<[u8]>::to_vec)), Some(vec![7, 8]));
    }

    #[test]
    fn test_loser_is_a_no_op() {
        let shared = shared();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let id = shared.with(|inner| inner.open(&[], 2)).unwrap();
        assert_eq!(shared.with(|inner| inner.park(id, RecordingToken(log.clone()))), None);

        assert!(completion(&shared, id).expire());
        assert!(!completion(&shared, id).deliver(&[1, 2]));
        assert!(!completion(&shared, id).fail(BusErrors::BUS_ERROR));

        assert_eq!(*log.lock().unwrap(), vec![Wakeup::Timeout]);
        assert!(shared.with(|inner| inner.errors.is_empty()));
    }

    #[test]
    fn test_stale_id_is_ignored() {
        let shared = shared();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let first = shared.with(|inner| inner.open(&[], 2)).unwrap();
        assert!(completion(&shared, first).fail(BusErrors::ACK_FAILURE));
        shared.with(|inner| inner.close(first));

        let second = shared.with(|inner| inner.open(&[], 2)).unwrap();
        assert_ne!(first, second);
        assert_eq!(shared.with(|inner| inner.park(second, RecordingToken(log.clone()))), None);

        // A late event for the first transaction must not touch the second.
        assert!(!completion(&shared, first).expire());
        assert!(log.lock().unwrap().is_empty());

        assert!(completion(&shared, second).deliver(&[3, 4]));
        assert_eq!(*log.lock().unwrap(), vec![Wakeup::Ok]);
    }

    #[test]
    fn test_failures_record_errors() {
        let shared = shared();
        let id = shared.with(|inner| inner.open(&[], 4)).unwrap();
        assert!(completion(&shared, id).fail(BusErrors::NONE));
        assert_eq!(shared.with(|inner| inner.errors), BusErrors::BUS_ERROR);
        shared.with(|inner| inner.close(id));

        let id = shared.with(|inner| inner.open(&[], 4)).unwrap();
        assert!(shared.with(|inner| inner.errors.is_empty()));
        // Short delivery counts as a bus error.
        assert!(completion(&shared, id).deliver(&[1]));
        let log = Arc::new(StdMutex::new(Vec::new()));
        assert_eq!(
            shared.with(|inner| inner.park(id, RecordingToken(log))),
            Some(Wakeup::Reset)
        );
        assert_eq!(shared.with(|inner| inner.errors), BusErrors::BUS_ERROR);
    }

    #[test]
    fn test_open_reports_overflow() {
        let shared = shared();
        assert_eq!(
            shared.with(|inner| inner.open(&[0; 9], 0)),
            Err(Error::BufferOverflow)
        );
        assert!(shared.with(|inner| inner.is_idle()));
    }
}
