// Licensed under the Apache-2.0 license

//! High-level I2C master controller.
//!
//! This module provides the blocking transaction engine: a caller asks for
//! "transmit N bytes, then receive M bytes, or give up after a deadline" and
//! is suspended until either the transport completes or the deadline fires.
//! It implements the embedded-hal I2C interface on top of that engine.

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{BusErrors, Error, I2cConfig, Timeout, Wakeup};
use crate::i2c::traits::{ByteChannel, DeadlineTimer, ThreadSuspension};
use crate::i2c::transaction::{Completion, Resolver, Shared};
use alloc::sync::Arc;
use embedded_hal::i2c::{Operation, SevenBitAddress};
use embedded_io::Error as _;

/// Transfer buffer capacity used when none is given.
pub const DEFAULT_BUFFER_SIZE: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Not started; the transfer buffer is unallocated.
    Stopped,
    /// Started and able to run transactions.
    Ready,
    /// A transaction timed out. The bus state is unknown until the controller
    /// is stopped and started again.
    Locked,
}

pub struct I2cController<C, T, S, L = NoOpLogger, const N: usize = DEFAULT_BUFFER_SIZE>
where
    C: ByteChannel,
    T: DeadlineTimer,
    S: ThreadSuspension,
    L: Logger,
{
    channel: C,
    timer: T,
    suspension: S,
    logger: L,
    config: I2cConfig,
    state: DriverState,
    shared: Arc<Shared<S::Token, N>>,
}

impl<C, T, S, L, const N: usize> I2cController<C, T, S, L, N>
where
    C: ByteChannel,
    T: DeadlineTimer,
    S: ThreadSuspension,
    L: Logger,
{
    /// Creates a stopped controller around its collaborators.
    pub fn new(channel: C, timer: T, suspension: S, logger: L) -> Self {
        Self {
            channel,
            timer,
            suspension,
            logger,
            config: I2cConfig::default(),
            state: DriverState::Stopped,
            shared: Arc::new(Shared::new()),
        }
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &I2cConfig {
        &self.config
    }

    /// Bus errors reported by the last transaction.
    #[must_use]
    pub fn errors(&self) -> BusErrors {
        self.shared.with(|inner| inner.errors)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    /// Allocates the transfer buffer and makes the controller ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationConflict`] if the controller is already
    /// started; its state is left unchanged.
    pub fn start(&mut self, config: I2cConfig) -> Result<(), Error> {
        if let Err(e) = self.shared.with(|inner| inner.buffer.allocate()) {
            self.logger
                .error(format_args!("i2c: start refused, transfer buffer in use"));
            return Err(e);
        }
        self.config = config;
        self.state = DriverState::Ready;
        self.logger.debug(format_args!(
            "i2c: started at {} Hz with a {} byte buffer",
            config.speed.hz(),
            N
        ));
        Ok(())
    }

    /// Releases the transfer buffer and stops the controller. This is the
    /// only way out of [`DriverState::Locked`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the controller is already stopped.
    pub fn stop(&mut self) -> Result<(), Error> {
        if self.state == DriverState::Stopped {
            return Err(Error::NotStarted);
        }
        self.shared.with(|inner| {
            debug_assert!(inner.is_idle(), "i2c: stop with a transaction pending");
            inner.buffer.release();
        });
        self.state = DriverState::Stopped;
        self.logger.debug(format_args!("i2c: stopped"));
        Ok(())
    }

    /// Transmits `tx` and then receives `rx.len()` bytes from `address`,
    /// blocking the caller until the transfer completes or `timeout` elapses.
    ///
    /// Either phase may be empty, but not both. A receive phase must be longer
    /// than one byte.
    ///
    /// # Errors
    ///
    /// * [`Error::ContractViolation`] - the request is malformed; the bus is
    ///   not touched.
    /// * [`Error::BufferOverflow`] - a phase exceeds the transfer buffer.
    /// * [`Error::NotStarted`] / [`Error::Locked`] - the controller cannot run
    ///   transactions right now.
    /// * [`Error::Reset`] - the bus reported errors; the controller stays
    ///   usable.
    /// * [`Error::Timeout`] - the deadline elapsed first; the controller is
    ///   locked until it is stopped and started again.
    pub fn master_transmit_receive(
        &mut self,
        address: SevenBitAddress,
        tx: &[u8],
        rx: &mut [u8],
        timeout: Timeout,
    ) -> Result<(), Error> {
        if let Err(e) = check_request(address, tx, rx.len(), timeout) {
            self.logger.error(format_args!(
                "i2c: rejected request to {address:#04x} (tx {}, rx {})",
                tx.len(),
                rx.len()
            ));
            return Err(e);
        }
        match self.state {
            DriverState::Ready => {}
            DriverState::Stopped => return Err(Error::NotStarted),
            DriverState::Locked => return Err(Error::Locked),
        }

        let id = self.shared.with(|inner| inner.open(tx, rx.len()))?;

        if let Timeout::After(interval) = timeout {
            let expiry = self.completion(id);
            self.timer.arm(interval, move || {
                expiry.expire();
            });
        }

        self.run_data_phase(address, id, rx.len());

        let msg = self.wait_for(id);

        if msg != Wakeup::Timeout && !timeout.is_infinite() {
            // A `false` here means the callback lost the race and found the
            // slot already resolved.
            let _ = self.timer.disarm();
        }

        let errors = self.shared.with(|inner| {
            inner.close(id);
            if msg == Wakeup::Ok {
                if let Some(received) = inner.buffer.rx() {
                    for (dst, src) in rx.iter_mut().zip(received) {
                        *dst = *src;
                    }
                }
            }
            inner.errors
        });

        match msg {
            Wakeup::Ok => Ok(()),
            Wakeup::Reset => {
                self.logger.error(format_args!(
                    "i2c: transfer to {address:#04x} failed, errors {:#04x}",
                    errors.bits()
                ));
                Err(Error::Reset(errors))
            }
            Wakeup::Timeout => {
                self.state = DriverState::Locked;
                self.logger.error(format_args!(
                    "i2c: transfer to {address:#04x} timed out, bus locked until restart"
                ));
                Err(Error::Timeout)
            }
        }
    }

    /// Transmit-only transaction.
    ///
    /// # Errors
    ///
    /// See [`master_transmit_receive`](Self::master_transmit_receive).
    pub fn master_transmit(
        &mut self,
        address: SevenBitAddress,
        tx: &[u8],
        timeout: Timeout,
    ) -> Result<(), Error> {
        self.master_transmit_receive(address, tx, &mut [], timeout)
    }

    /// Receive-only transaction.
    ///
    /// # Errors
    ///
    /// See [`master_transmit_receive`](Self::master_transmit_receive).
    pub fn master_receive(
        &mut self,
        address: SevenBitAddress,
        rx: &mut [u8],
        timeout: Timeout,
    ) -> Result<(), Error> {
        self.master_transmit_receive(address, &[], rx, timeout)
    }

    fn completion(&self, id: u32) -> Completion {
        let target: Arc<dyn Resolver> = self.shared.clone();
        Completion::new(target, id)
    }

    /// Drives the transport. Every exit path hands the outcome to the slot,
    /// except a read whose completion is still outstanding.
    fn run_data_phase(&mut self, address: SevenBitAddress, id: u32, rx_len: usize) {
        let staged = self.shared.with(|inner| inner.buffer.take_tx());
        let written = match staged.as_deref() {
            Some(bytes) if !bytes.is_empty() => self.channel.write(address, bytes),
            _ => Ok(()),
        };
        self.shared.with(|inner| inner.buffer.restore_tx(staged));

        if let Err(e) = written {
            self.logger.debug(format_args!(
                "i2c: write to {address:#04x} failed: {:?}",
                e.kind()
            ));
            self.completion(id).fail_with(&e);
            return;
        }

        if rx_len == 0 {
            self.completion(id).finish();
            return;
        }

        let done = self.completion(id);
        if let Err(e) = self.channel.read(address, rx_len, done) {
            self.logger.debug(format_args!(
                "i2c: read from {address:#04x} failed: {:?}",
                e.kind()
            ));
            self.completion(id).fail_with(&e);
        }
    }

    /// Returns the result of transaction `id`, suspending the caller only if
    /// it has not arrived yet.
    fn wait_for(&mut self, id: u32) -> Wakeup {
        let token = self.suspension.prepare();
        // Checking the slot and publishing the token is one critical section,
        // so a resolution cannot slip in between.
        match self.shared.with(|inner| inner.park(id, token)) {
            Some(msg) => msg,
            None => self.suspension.suspend(),
        }
    }
}

fn check_request(
    address: SevenBitAddress,
    tx: &[u8],
    rx_len: usize,
    timeout: Timeout,
) -> Result<(), Error> {
    if address > 0x7f || rx_len == 1 || (tx.is_empty() && rx_len == 0) {
        return Err(Error::ContractViolation);
    }
    if let Timeout::After(interval) = timeout {
        if interval.ticks() == 0 {
            return Err(Error::ContractViolation);
        }
    }
    Ok(())
}

impl<C, T, S, L, const N: usize> embedded_hal::i2c::ErrorType for I2cController<C, T, S, L, N>
where
    C: ByteChannel,
    T: DeadlineTimer,
    S: ThreadSuspension,
    L: Logger,
{
    type Error = Error;
}

impl<C, T, S, L, const N: usize> embedded_hal::i2c::I2c for I2cController<C, T, S, L, N>
where
    C: ByteChannel,
    T: DeadlineTimer,
    S: ThreadSuspension,
    L: Logger,
{
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let timeout = self.config.timeout;
        self.master_receive(addr, buffer, timeout)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        let timeout = self.config.timeout;
        self.master_transmit(addr, bytes, timeout)
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        let timeout = self.config.timeout;
        self.master_transmit_receive(addr, bytes, buffer, timeout)
    }

    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let timeout = self.config.timeout;
        let mut ops = operations.iter_mut().peekable();
        while let Some(op) = ops.next() {
            match op {
                Operation::Write(bytes) => {
                    if let Some(Operation::Read(buffer)) = ops.peek_mut() {
                        self.master_transmit_receive(addr, bytes, buffer, timeout)?;
                        ops.next();
                    } else {
                        self.master_transmit(addr, bytes, timeout)?;
                    }
                }
                Operation::Read(buffer) => self.master_receive(addr, buffer, timeout)?,
            }
        }
        Ok(())
    }
}
