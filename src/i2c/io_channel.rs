// Licensed under the Apache-2.0 license

//! [`ByteChannel`] over any `embedded_io` stream.
//!
//! Streams carry no addressing, so the address is dropped and the stream is
//! taken to be wired to a single device. Reads block on the stream and
//! complete inline.

use crate::i2c::common::BusErrors;
use crate::i2c::traits::ByteChannel;
use crate::i2c::transaction::Completion;
use embedded_hal::i2c::SevenBitAddress;
use embedded_io::{Read, ReadExactError, Write};
use heapless::Vec;

pub struct IoChannel<T, const N: usize = 32> {
    io: T,
}

impl<T, const N: usize> IoChannel<T, N>
where
    T: Read + Write,
{
    pub fn new(io: T) -> Self {
        Self { io }
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T, const N: usize> ByteChannel for IoChannel<T, N>
where
    T: Read + Write,
{
    type Error = T::Error;

    fn write(&mut self, _address: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.io.write_all(bytes)?;
        self.io.flush()
    }

    fn read(
        &mut self,
        _address: SevenBitAddress,
        len: usize,
        done: Completion,
    ) -> Result<(), Self::Error> {
        let mut received: Vec<u8, N> = Vec::new();
        if received.resize(len, 0).is_err() {
            done.fail(BusErrors::OVERRUN);
            return Ok(());
        }
        match self.io.read_exact(&mut received) {
            Ok(()) => {
                done.deliver(&received);
                Ok(())
            }
            Err(ReadExactError::UnexpectedEof) => {
                done.fail(BusErrors::BUS_ERROR);
                Ok(())
            }
            Err(ReadExactError::Other(e)) => Err(e),
        }
    }
}
