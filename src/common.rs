// Licensed under the Apache-2.0 license

//! Shared plumbing used by every driver module.

use core::fmt;

/// Minimal logging sink used by the drivers.
///
/// Drivers take the logger as a type parameter so that builds without a
/// console pay nothing for it (see [`NoOpLogger`]).
pub trait Logger {
    fn debug(&mut self, args: fmt::Arguments<'_>);
    fn error(&mut self, args: fmt::Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Logger writing `[LEVEL] message` lines to an `embedded_io` sink, such as
/// a UART or the host console.
pub struct IoLogger<W: embedded_io::Write> {
    sink: W,
}

impl<W: embedded_io::Write> IoLogger<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn line(&mut self, level: &str, args: fmt::Arguments<'_>) {
        // A failing log sink must never take the driver down with it.
        let _ = self.sink.write_fmt(format_args!("[{level}] {args}\r\n"));
    }
}

impl<W: embedded_io::Write> Logger for IoLogger<W> {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        self.line("DEBUG", args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.line("ERROR", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn test_io_logger_formats_lines() {
        let mut logger = IoLogger::new(Vec::new());
        logger.debug(format_args!("started at {} Hz", 100_000));
        logger.error(format_args!("bus errors {:#04x}", 0x04));

        let text = std::string::String::from_utf8(logger.into_inner()).unwrap();
        assert_eq!(
            text,
            "[DEBUG] started at 100000 Hz\r\n[ERROR] bus errors 0x04\r\n"
        );
    }

    #[test]
    fn test_noop_logger_accepts_anything() {
        let mut logger = NoOpLogger {};
        logger.debug(format_args!("{}", 1));
        logger.error(format_args!("{}", 2));
    }
}
