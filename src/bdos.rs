//! Emulation of the two CP/M BDOS calls the ZEX test suites make.
//!
//! A CP/M program requests a system call by loading `C` with a function number and `DE` with a
//! parameter and then calling address 5. The loader patches that entry point with `IN A,(0)`
//! followed by `RET`, so the call arrives here as a port read. The warm-boot vector at 0 is
//! patched with `OUT (0),A`, which arrives as a port write and ends the run.

use std::io::{self, Write};

use thiserror::Error;

use crate::exec::{Cpu, PortIo, Register, RegisterPair};

/// BDOS function 2: write the character in `E` to the console.
pub const CONSOLE_OUTPUT: u8 = 2;
/// BDOS function 9: write the `$`-terminated string at `DE` to the console.
pub const PRINT_STRING: u8 = 9;
/// Terminator of a BDOS function 9 string.
pub const STRING_TERMINATOR: u8 = b'$';
/// The most characters a single function 9 call will print.
pub const MAX_STRING_LENGTH: usize = 100;

/// A console byte that is not an ASCII character.
#[derive(Clone, Copy, Debug, Error, Hash, PartialEq, Eq)]
#[error("byte 0x{0:02x} is not an ASCII character")]
pub struct DecodeError(pub u8);

/// Decodes one console byte as an ASCII character.
pub fn decode_char(byte: u8) -> Result<char, DecodeError> {
    if byte.is_ascii() {
        Ok(byte as char)
    } else {
        Err(DecodeError(byte))
    }
}

/// A [`PortIo`] handler implementing the BDOS console calls and the warm-boot halt trap.
///
/// Selectors in `C`:
/// 2 (console output): Writes the character in `E`.
/// 9 (print string): Writes the string at `DE`, up to the `$` terminator or
/// [`MAX_STRING_LENGTH`] characters, whichever comes first.
///
/// Every other selector is ignored. Bytes that do not decode as ASCII are written as a space.
/// All calls return 0 in `A`.
#[derive(Debug)]
pub struct SystemCalls<W> {
    console: W,
    halted: bool,
    fault: Option<io::Error>,
}
impl<W: Write> SystemCalls<W> {
    pub fn new(console: W) -> Self {
        Self {
            console,
            halted: false,
            fault: None,
        }
    }

    /// Whether the program has jumped to the warm-boot vector.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Takes the first console write error since the last call, if any.
    pub fn take_fault(&mut self) -> Option<io::Error> {
        self.fault.take()
    }

    pub fn console(&self) -> &W {
        &self.console
    }
    pub fn into_console(self) -> W {
        self.console
    }

    fn emit(&mut self, byte: u8) {
        let character = decode_char(byte).unwrap_or(' ');
        let result = self
            .console
            .write_all(&[character as u8])
            .and_then(|()| self.console.flush());
        // keep the first failure, later ones are usually the same broken pipe
        if let Err(error) = result {
            if self.fault.is_none() {
                self.fault = Some(error);
            }
        }
    }

    fn print_string(&mut self, cpu: &dyn Cpu) {
        let mut address = cpu.register_pair(RegisterPair::DE);
        let mut emitted = 0;
        while emitted < MAX_STRING_LENGTH {
            let byte = cpu.memory().load_u8(address);
            if byte == STRING_TERMINATOR {
                return;
            }
            self.emit(byte);
            emitted += 1;
            address = address.wrapping_add(1);
        }
        tracing::trace!(
            start = cpu.register_pair(RegisterPair::DE),
            "string truncated at {MAX_STRING_LENGTH} characters"
        );
    }
}
impl<W: Write> PortIo for SystemCalls<W> {
    fn port_in(&mut self, _port: u16, cpu: &dyn Cpu) -> u8 {
        match cpu.register(Register::C) {
            CONSOLE_OUTPUT => self.emit(cpu.register(Register::E)),
            PRINT_STRING => self.print_string(cpu),
            selector => tracing::debug!(selector, "ignoring unsupported BDOS call"),
        }
        0
    }
    fn port_out(&mut self, _port: u16, _value: u8) {
        self.halted = true;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{mem::FlatMemory, z80::Z80};

    fn cpu_with(selector: u8, parameter: u16) -> Z80<FlatMemory> {
        let mut cpu = Z80::new(FlatMemory::new());
        cpu.set_register(Register::C, selector);
        cpu.set_register_pair(RegisterPair::DE, parameter);
        cpu
    }

    fn call(cpu: &Z80<FlatMemory>) -> (u8, String) {
        let mut calls = SystemCalls::new(Vec::new());
        let result = calls.port_in(0, cpu);
        assert!(!calls.is_halted());
        (result, String::from_utf8(calls.into_console()).unwrap())
    }

    #[test]
    fn console_output_writes_e() {
        let cpu = cpu_with(CONSOLE_OUTPUT, 0x0041);
        assert_eq!(call(&cpu), (0, "A".to_string()));
    }

    #[test]
    fn print_string_stops_before_terminator() {
        let mut cpu = cpu_with(PRINT_STRING, 0x0200);
        for (offset, byte) in [0x42, 0x43, b'$', 0x44].into_iter().enumerate() {
            cpu.write_memory(0x0200 + offset as u16, byte);
        }
        assert_eq!(call(&cpu), (0, "BC".to_string()));
    }

    #[test]
    fn print_string_passes_line_endings_through() {
        let mut cpu = cpu_with(PRINT_STRING, 0x0300);
        for (offset, byte) in b"ok\r\n$".iter().enumerate() {
            cpu.write_memory(0x0300 + offset as u16, *byte);
        }
        assert_eq!(call(&cpu).1, "ok\r\n");
    }

    #[test]
    fn unterminated_string_is_capped() {
        let mut cpu = cpu_with(PRINT_STRING, 0x1000);
        for offset in 0..200 {
            cpu.write_memory(0x1000 + offset, b'x');
        }
        let (result, output) = call(&cpu);
        assert_eq!(result, 0);
        assert_eq!(output, "x".repeat(MAX_STRING_LENGTH));
    }

    #[test]
    fn print_string_wraps_at_top_of_memory() {
        let mut cpu = cpu_with(PRINT_STRING, 0xffff);
        cpu.write_memory(0xffff, b'a');
        cpu.write_memory(0x0000, b'b');
        cpu.write_memory(0x0001, b'$');
        assert_eq!(call(&cpu).1, "ab");
    }

    #[rstest]
    #[case::console_output(CONSOLE_OUTPUT)]
    #[case::print_string(PRINT_STRING)]
    fn non_ascii_becomes_space(#[case] selector: u8) {
        let mut cpu = cpu_with(selector, 0x00c8);
        cpu.write_memory(0x00c8, 0xc8);
        cpu.write_memory(0x00c9, b'$');
        assert_eq!(call(&cpu), (0, " ".to_string()));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(10)]
    #[case(0xff)]
    fn other_selectors_do_nothing(#[case] selector: u8) {
        let cpu = cpu_with(selector, 0x0041);
        assert_eq!(call(&cpu), (0, String::new()));
    }

    #[test]
    fn port_write_halts_whatever_the_arguments() {
        let mut calls = SystemCalls::new(Vec::new());
        calls.port_out(0x1234, 0x56);
        assert!(calls.is_halted());
        assert!(calls.console().is_empty());
    }

    #[test]
    fn decode_rejects_high_bytes() {
        assert_eq!(decode_char(b'$'), Ok('$'));
        assert_eq!(decode_char(0x80), Err(DecodeError(0x80)));
    }

    struct BrokenConsole;
    impl Write for BrokenConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_errors_are_kept_for_the_driver() {
        let cpu = cpu_with(CONSOLE_OUTPUT, 0x0041);
        let mut calls = SystemCalls::new(BrokenConsole);
        assert_eq!(calls.port_in(0, &cpu), 0);
        let fault = calls.take_fault().unwrap();
        assert_eq!(fault.kind(), io::ErrorKind::BrokenPipe);
        assert!(calls.take_fault().is_none());
    }
}
