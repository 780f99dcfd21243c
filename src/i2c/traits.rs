// Licensed under the Apache-2.0 license

//! # Collaborator Traits for the Transaction Engine
//!
//! The I2C controller does not talk to hardware, clocks or the scheduler
//! directly. Each of those concerns sits behind a small trait so that the
//! engine can be driven by real peripherals, host threads or scripted mocks.
//!
//! ## Trait Map
//!
//! ```text
//! I2cController
//!     ├── ByteChannel        (moves bytes over the bus)
//!     ├── DeadlineTimer      (one-shot, cancelable deadline)
//!     └── ThreadSuspension   (parks the caller until resumed)
//!             └── ResumeToken  (single-use handle that resumes it)
//! ```

use crate::i2c::common::Wakeup;
use crate::i2c::transaction::Completion;
use embedded_hal::i2c::SevenBitAddress;
use fugit::MillisDurationU32;

/// Single-use handle that resumes a suspended execution context.
///
/// `resume` consumes the token, so a context can never be resumed twice
/// through the same token.
pub trait ResumeToken: Send + 'static {
    /// Makes the suspended context runnable and hands it `msg`.
    fn resume(self, msg: Wakeup);
}

/// Cooperative suspend/resume primitive of the scheduler.
///
/// The engine calls [`prepare`](Self::prepare) to obtain a token bound to the
/// calling context, publishes the token where the completion and timeout
/// paths can reach it, and then calls [`suspend`](Self::suspend). A token
/// resumed before `suspend` is entered must not be lost: `suspend` returns
/// immediately in that case.
///
/// # Examples
///
/// ```rust,no_run
/// use i2c_transact::i2c::{ResumeToken, ThreadSuspension, Wakeup};
///
/// fn handoff<S: ThreadSuspension>(scheduler: &mut S) -> Wakeup {
///     let token = scheduler.prepare();
///     std::thread::spawn(move || token.resume(Wakeup::Ok));
///     scheduler.suspend()
/// }
/// ```
pub trait ThreadSuspension {
    type Token: ResumeToken;

    /// Creates the token for the next suspension of the calling context.
    /// A fresh call invalidates tokens from earlier calls that were never
    /// resumed.
    fn prepare(&mut self) -> Self::Token;

    /// Blocks the calling context until the token from the last
    /// [`prepare`](Self::prepare) is resumed, and returns its message.
    fn suspend(&mut self) -> Wakeup;
}

/// Cancelable one-shot deadline.
///
/// # Race contract
///
/// [`disarm`](Self::disarm) is the single source of truth when the deadline
/// and the completion of a transfer happen at the same time:
///
/// * `true`: the callback has not run and never will.
/// * `false`: the callback already ran, or is committed to run.
pub trait DeadlineTimer {
    /// Schedules `on_fire` to run once after `interval`. Arming again
    /// replaces an outstanding arm.
    fn arm<F>(&mut self, interval: MillisDurationU32, on_fire: F)
    where
        F: FnOnce() + Send + 'static;

    /// Tries to cancel the outstanding arm.
    fn disarm(&mut self) -> bool;
}

/// Physical transport of an I2C bus.
///
/// Writes are synchronous. Reads hand the transport a [`Completion`]; the
/// transport may deliver the received bytes before returning (polled or
/// stream transports) or later from another context (interrupt or DMA
/// completion). A transport that never uses the completion models a stalled
/// bus.
///
/// # Examples
///
/// ```rust,no_run
/// use i2c_transact::i2c::{ByteChannel, Completion};
/// use embedded_hal::i2c::SevenBitAddress;
///
/// struct Echo;
///
/// impl ByteChannel for Echo {
///     type Error = embedded_io::ErrorKind;
///
///     fn write(&mut self, _address: SevenBitAddress, _bytes: &[u8]) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     fn read(
///         &mut self,
///         _address: SevenBitAddress,
///         len: usize,
///         done: Completion,
///     ) -> Result<(), Self::Error> {
///         let reply = [0xA5u8; 64];
///         done.deliver(reply.get(..len).ok_or(embedded_io::ErrorKind::InvalidInput)?);
///         Ok(())
///     }
/// }
/// ```
pub trait ByteChannel {
    /// Transport error; its kind is recorded as bus error flags.
    type Error: embedded_io::Error;

    /// Writes `bytes` to the device at `address`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the bytes could not be sent. The
    /// transaction then ends with `Reset`.
    fn write(&mut self, address: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Requests `len` bytes from the device at `address` and reports them
    /// through `done`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be issued. The
    /// transaction then ends with `Reset`, unless `done` already resolved it.
    fn read(
        &mut self,
        address: SevenBitAddress,
        len: usize,
        done: Completion,
    ) -> Result<(), Self::Error>;
}
