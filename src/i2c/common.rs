// Licensed under the Apache-2.0 license

//! Common types and constants for the I2C driver modules.
//!
//! This module provides shared definitions for error handling, bus error
//! flags, timeouts and controller configuration.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use fugit::MillisDurationU32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cSpeed {
    Standard = 100_000,
    Fast = 400_000,
    FastPlus = 1_000_000,
}

impl I2cSpeed {
    #[must_use]
    pub const fn hz(self) -> u32 {
        self as u32
    }
}

/// How long a transaction may take before it is abandoned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// Wait for the transport for as long as it takes.
    Infinite,
    /// Abandon the transaction once the interval has elapsed.
    After(MillisDurationU32),
}

impl Timeout {
    #[must_use]
    pub const fn millis(ms: u32) -> Self {
        Self::After(MillisDurationU32::millis(ms))
    }

    #[must_use]
    pub const fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl From<MillisDurationU32> for Timeout {
    fn from(interval: MillisDurationU32) -> Self {
        Self::After(interval)
    }
}

/// Bus error conditions reported by the last transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusErrors(u8);

impl BusErrors {
    pub const NONE: Self = Self(0x00);
    pub const BUS_ERROR: Self = Self(0x01);
    pub const ARBITRATION_LOST: Self = Self(0x02);
    pub const ACK_FAILURE: Self = Self(0x04);
    pub const OVERRUN: Self = Self(0x08);
    pub const PEC_ERROR: Self = Self(0x10);
    pub const TIMEOUT: Self = Self(0x20);
    pub const SMB_ALERT: Self = Self(0x40);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Classifies a transport error reported through `embedded_io`.
    #[must_use]
    pub fn from_io_kind(kind: embedded_io::ErrorKind) -> Self {
        use embedded_io::ErrorKind as Io;
        match kind {
            Io::NotFound | Io::NotConnected | Io::ConnectionRefused | Io::AddrNotAvailable => {
                Self::ACK_FAILURE
            }
            Io::Interrupted | Io::ConnectionAborted => Self::ARBITRATION_LOST,
            Io::TimedOut => Self::TIMEOUT,
            _ => Self::BUS_ERROR,
        }
    }

    /// The most significant condition, expressed as an embedded-hal error kind.
    #[must_use]
    pub fn kind(self) -> ErrorKind {
        if self.contains(Self::ACK_FAILURE) {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
        } else if self.contains(Self::ARBITRATION_LOST) {
            ErrorKind::ArbitrationLoss
        } else if self.contains(Self::OVERRUN) {
            ErrorKind::Overrun
        } else if self.contains(Self::BUS_ERROR) {
            ErrorKind::Bus
        } else {
            ErrorKind::Other
        }
    }
}

impl BitOr for BusErrors {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BusErrors {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Message delivered to a suspended caller when it is resumed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Wakeup {
    /// The data phase completed.
    Ok = 1,
    /// The transport reported one or more bus errors.
    Reset = 2,
    /// The deadline elapsed first.
    Timeout = 3,
}

impl Wakeup {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Ok),
            2 => Some(Self::Reset),
            3 => Some(Self::Timeout),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// `start` found the transfer buffer already allocated.
    AllocationConflict,
    /// The request broke a caller contract (receive length, address, zero
    /// timeout, empty request).
    ContractViolation,
    /// The request does not fit in the transfer buffer.
    BufferOverflow,
    /// The controller has not been started.
    NotStarted,
    /// A previous transaction timed out; the controller must be stopped and
    /// started again.
    Locked,
    /// The bus reported errors during the transfer.
    Reset(BusErrors),
    /// The deadline elapsed before the transfer completed.
    Timeout,
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Reset(errors) => errors.kind(),
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationConflict => f.write_str("transfer buffer already allocated"),
            Error::ContractViolation => f.write_str("request violates the driver contract"),
            Error::BufferOverflow => f.write_str("request exceeds the transfer buffer"),
            Error::NotStarted => f.write_str("controller not started"),
            Error::Locked => f.write_str("controller locked after a timeout"),
            Error::Reset(errors) => write!(f, "bus errors {:#04x}", errors.bits()),
            Error::Timeout => f.write_str("transaction timed out"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct I2cConfig {
    pub speed: I2cSpeed,
    /// Deadline used by the `embedded_hal` interface.
    pub timeout: Timeout,
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfigBuilder::new().build()
    }
}

pub struct I2cConfigBuilder {
    speed: I2cSpeed,
    timeout: Option<Timeout>,
}

impl Default for I2cConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            speed: I2cSpeed::Standard,
            timeout: None,
        }
    }
    #[must_use]
    pub fn speed(mut self, speed: I2cSpeed) -> Self {
        self.speed = speed;
        self
    }
    #[must_use]
    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
    #[must_use]
    pub fn build(self) -> I2cConfig {
        I2cConfig {
            speed: self.speed,
            timeout: self.timeout.unwrap_or(Timeout::millis(100)),
        }
    }
}
