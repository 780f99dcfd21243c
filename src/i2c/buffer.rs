// Licensed under the Apache-2.0 license

//! Transfer storage standing in for a DMA channel.
//!
//! Each controller owns exactly one [`TransferBuffer`]. It is allocated by
//! `start`, refilled for every transaction and released by `stop`.

use crate::i2c::common::Error;
use heapless::Vec;

pub struct TransferBuffer<const N: usize> {
    allocated: bool,
    tx: Option<Vec<u8, N>>,
    rx: Option<Vec<u8, N>>,
    rx_expected: usize,
}

impl<const N: usize> Default for TransferBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TransferBuffer<N> {
    /// An unallocated buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocated: false,
            tx: None,
            rx: None,
            rx_expected: 0,
        }
    }

    /// Bytes available per direction.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Claims the buffer for a controller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationConflict`] if the buffer is already claimed.
    pub fn allocate(&mut self) -> Result<(), Error> {
        if self.allocated {
            return Err(Error::AllocationConflict);
        }
        self.allocated = true;
        self.tx = None;
        self.rx = None;
        self.rx_expected = 0;
        Ok(())
    }

    /// Frees any staged storage and gives the buffer up. Safe to call on a
    /// buffer that never staged anything.
    pub fn release(&mut self) {
        self.tx = None;
        self.rx = None;
        self.rx_expected = 0;
        self.allocated = false;
    }

    /// Copies the outgoing bytes of the next transfer into the buffer.
    ///
    /// # Errors
    ///
    /// [`Error::NotStarted`] when unallocated, [`Error::BufferOverflow`] when
    /// `bytes` does not fit.
    pub fn stage_tx(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if !self.allocated {
            return Err(Error::NotStarted);
        }
        let staged = Vec::from_slice(bytes).map_err(|()| Error::BufferOverflow)?;
        self.tx = Some(staged);
        Ok(())
    }

    /// Reserves room for `len` incoming bytes and discards stale rx data.
    ///
    /// # Errors
    ///
    /// [`Error::NotStarted`] when unallocated, [`Error::BufferOverflow`] when
    /// `len` exceeds the capacity.
    pub fn stage_rx(&mut self, len: usize) -> Result<(), Error> {
        if !self.allocated {
            return Err(Error::NotStarted);
        }
        if len > N {
            return Err(Error::BufferOverflow);
        }
        self.rx_expected = len;
        match self.rx.as_mut() {
            Some(rx) => rx.clear(),
            None => self.rx = Some(Vec::new()),
        }
        Ok(())
    }

    /// Stores bytes delivered by the transport. Returns `false` when the
    /// delivery does not match the staged length; nothing is stored then.
    pub fn fill_rx(&mut self, bytes: &[u8]) -> bool {
        if !self.allocated || bytes.len() != self.rx_expected {
            return false;
        }
        match Vec::from_slice(bytes) {
            Ok(received) => {
                self.rx = Some(received);
                true
            }
            Err(()) => false,
        }
    }

    /// Hands the staged tx bytes out for the duration of a write.
    pub fn take_tx(&mut self) -> Option<Vec<u8, N>> {
        self.tx.take()
    }

    /// Returns storage handed out by [`take_tx`](Self::take_tx).
    pub fn restore_tx(&mut self, staged: Option<Vec<u8, N>>) {
        if self.allocated {
            self.tx = staged;
        }
    }

    #[must_use]
    pub fn tx(&self) -> Option<&[u8]> {
        self.tx.as_deref()
    }

    #[must_use]
    pub fn rx(&self) -> Option<&[u8]> {
        self.rx.as_deref()
    }
}
