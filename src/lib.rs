//! Runs CP/M conformance programs such as ZEXDOC and ZEXALL on a Z80 emulator.
//!
//! The programs report through two CP/M BDOS calls and finish by jumping to the warm-boot
//! vector. Neither needs a real operating system: [`loader::load_image`] patches the BDOS entry
//! point and the warm-boot vector with port instructions, and [`bdos::SystemCalls`] services
//! those ports while a [`driver::Driver`] steps the CPU.
//!
//! Any processor implementing [`Cpu`] can be driven. [`Z80`] is provided.

mod bits;
mod instruction;

pub mod bdos;
pub mod driver;
pub mod exec;
pub mod loader;
pub mod mem;
pub mod z80;

pub use bdos::{DecodeError, SystemCalls};
pub use driver::{CLOCK_HZ, Driver, RunError, RunReport, run_file, run_image};
pub use exec::{Cpu, ExecutionError, PortIo, Register, RegisterPair};
pub use loader::{LOAD_ORIGIN, LoadError, load_image, read_image};
pub use mem::{FlatMemory, Memory};
pub use z80::Z80;
