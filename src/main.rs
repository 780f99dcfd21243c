// Licensed under the Apache-2.0 license

use std::io::Write as _;

use embedded_hal::i2c::SevenBitAddress;
use embedded_io::Write;
use i2c_transact::common::IoLogger;
use i2c_transact::i2c::{
    ByteChannel, Completion, Error, I2cConfigBuilder, I2cController, I2cSpeed, Timeout,
};
use i2c_transact::suspend::BlockingSuspension;
use i2c_transact::tests::functional::transaction_test::run_transaction_tests;
use i2c_transact::timer::ThreadTimer;

/// Host console as an `embedded_io` sink.
struct Console(std::io::Stdout);

impl embedded_io::ErrorType for Console {
    type Error = std::io::Error;
}

impl Write for Console {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush()
    }
}

/// Device that answers from a helper thread after a fixed delay, or never.
struct DelayedDevice {
    reply: Option<std::time::Duration>,
}

impl ByteChannel for DelayedDevice {
    type Error = embedded_io::ErrorKind;

    fn write(&mut self, _address: SevenBitAddress, _bytes: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn read(
        &mut self,
        _address: SevenBitAddress,
        len: usize,
        done: Completion,
    ) -> Result<(), Self::Error> {
        if let Some(delay) = self.reply {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                let payload: Vec<u8> = (0x43..).take(len).collect();
                done.deliver(&payload);
            });
        }
        Ok(())
    }
}

fn run_threaded_demo(uart: &mut Console) -> Result<(), Error> {
    let _ = writeln!(uart, "\r\n=== Threaded I2C Demo ===\r");

    let config = I2cConfigBuilder::new()
        .speed(I2cSpeed::Fast)
        .timeout(Timeout::millis(100))
        .build();
    let device = DelayedDevice {
        reply: Some(std::time::Duration::from_millis(10)),
    };
    let mut i2c: I2cController<_, _, _, _> = I2cController::new(
        device,
        ThreadTimer::new(),
        BlockingSuspension::new(),
        IoLogger::new(Console(std::io::stdout())),
    );
    i2c.start(config)?;

    let mut rx = [0u8; 4];
    i2c.master_transmit_receive(0x42, &[0x41, 0x42], &mut rx, Timeout::millis(100))?;
    let _ = writeln!(uart, "received {rx:02x?}\r");

    i2c.channel_mut().reply = None;
    match i2c.master_transmit_receive(0x42, &[0x41, 0x42], &mut rx, Timeout::millis(5)) {
        Err(e) => {
            let _ = writeln!(uart, "stalled device: {e}\r");
        }
        Ok(()) => {
            let _ = writeln!(uart, "stalled device answered\r");
        }
    }
    i2c.stop()?;
    Ok(())
}

fn main() {
    let mut uart = Console(std::io::stdout());

    writeln!(uart, "\r\nHello, i2c-transact!!\r").ok();

    run_transaction_tests(&mut uart);

    if let Err(e) = run_threaded_demo(&mut uart) {
        writeln!(uart, "demo failed: {e}\r").ok();
        std::process::exit(1);
    }
}
