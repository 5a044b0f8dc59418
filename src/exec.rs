use thiserror::Error;

use crate::mem::Memory;

/// An 8-bit register visible to the harness.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Register {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// A 16-bit register or register pair visible to the harness.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RegisterPair {
    AF,
    BC,
    DE,
    HL,
    SP,
}

/// Handles port I/O on behalf of a [`Cpu`].
///
/// The handler is called synchronously from inside [`Cpu::step`], with the CPU lent back
/// as `cpu` so it can inspect registers and memory mid-instruction.
pub trait PortIo {
    /// Handles an input instruction, returning the byte read from `port`.
    fn port_in(&mut self, port: u16, cpu: &dyn Cpu) -> u8;
    /// Handles an output instruction writing `value` to `port`.
    fn port_out(&mut self, port: u16, value: u8);
}

/// An 8-bit CPU that the harness can load, drive and inspect.
pub trait Cpu {
    /// Executes exactly one instruction, calling into `io` for any port access it makes.
    fn step(&mut self, io: &mut dyn PortIo) -> Result<(), ExecutionError>;

    /// The program counter.
    fn pc(&self) -> u16;
    fn set_pc(&mut self, pc: u16);

    fn register(&self, register: Register) -> u8;
    fn register_pair(&self, pair: RegisterPair) -> u16;

    fn memory(&self) -> &dyn Memory;
    fn memory_mut(&mut self) -> &mut dyn Memory;

    /// Reads `length` bytes of memory starting at `address`.
    fn read_memory(&self, address: u16, length: usize) -> Vec<u8> {
        self.memory().read(address, length)
    }
    /// Writes one byte of memory.
    fn write_memory(&mut self, address: u16, value: u8) {
        self.memory_mut().store_u8(address, value);
    }
}

/// Represents an error during execution.
#[derive(Clone, Copy, Debug, Error, Hash, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("encountered unimplemented opcode 0x{opcode:02x} at 0x{address:04x}")]
    Unimplemented { opcode: u8, address: u16 },
}
