// Licensed under the Apache-2.0 license

//! Blocking I2C master driver.
//!
//! The controller runs one transaction at a time on top of three
//! collaborators: a byte transport ([`traits::ByteChannel`]), a cancelable
//! deadline ([`traits::DeadlineTimer`]) and the scheduler's suspend/resume
//! primitive ([`traits::ThreadSuspension`]).

pub mod buffer;
pub mod common;
pub mod i2c_controller;
pub mod io_channel;
pub mod traits;
pub mod transaction;

pub use buffer::TransferBuffer;
pub use common::{BusErrors, Error, I2cConfig, I2cConfigBuilder, I2cSpeed, Timeout, Wakeup};
pub use i2c_controller::{DriverState, I2cController, DEFAULT_BUFFER_SIZE};
pub use io_channel::IoChannel;
pub use traits::{ByteChannel, DeadlineTimer, ResumeToken, ThreadSuspension};
pub use transaction::Completion;
