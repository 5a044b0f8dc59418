//! Drives a [`Cpu`] through a trapped CP/M program until it jumps to the warm-boot vector.

use std::{
    fmt::{self, Display},
    io::{self, Write},
    path::Path,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    bdos::SystemCalls,
    exec::{Cpu, ExecutionError},
    loader::{self, LoadError},
    mem::FlatMemory,
    z80::Z80,
};

/// A Zilog Z80A as fitted to the ZX Spectrum runs at 3.5 MHz.
pub const CLOCK_HZ: u64 = 3_500_000;

/// Represents an error that ended a run early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("couldn't write to the console")]
    Console(#[source] io::Error),
}

/// The outcome of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub name: String,
    /// Instructions executed, including the one that hit the halt trap.
    pub instructions: u64,
    pub clock_hz: u64,
    pub wall_time: Duration,
}
impl RunReport {
    /// How long the run would take on real hardware, assuming one instruction per clock tick.
    pub fn emulated_seconds(&self) -> f64 {
        self.instructions as f64 / self.clock_hz as f64
    }
    pub fn emulated_hours(&self) -> f64 {
        self.emulated_seconds() / 3600.0
    }
}
impl Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} instruction(s) emulated.", self.instructions)?;
        writeln!(
            f,
            "For a Z80 running at {}MHz, that would be {:.0} seconds or {:.2} hour(s).",
            self.clock_hz as f64 / 1_000_000.0,
            self.emulated_seconds(),
            self.emulated_hours()
        )?;
        write!(
            f,
            "Emulating {} took a total of {:.0} seconds",
            self.name,
            self.wall_time.as_secs_f64()
        )
    }
}

/// Runs one program on one CPU.
///
/// The driver owns the CPU, the [`SystemCalls`] handler with its halt flag, and the instruction
/// count, so nothing is shared between runs. Build a new driver (and CPU) for every image.
#[derive(Debug)]
pub struct Driver<C, W> {
    cpu: C,
    calls: SystemCalls<W>,
    instructions: u64,
}
impl<C: Cpu, W: Write> Driver<C, W> {
    pub fn new(cpu: C, console: W) -> Self {
        Self {
            cpu,
            calls: SystemCalls::new(console),
            instructions: 0,
        }
    }

    /// Loads `image` and patches the traps. See [`loader::load_image`].
    pub fn load(&mut self, image: &[u8]) -> Result<(), LoadError> {
        loader::load_image(&mut self.cpu, image)
    }

    /// Executes one instruction and counts it.
    ///
    /// Once the halt trap has fired this does nothing: the CPU is left as it stopped.
    pub fn step(&mut self) -> Result<(), RunError> {
        if self.calls.is_halted() {
            return Ok(());
        }
        tracing::trace!(pc = self.cpu.pc(), "step");
        self.cpu.step(&mut self.calls)?;
        self.instructions += 1;
        if let Some(error) = self.calls.take_fault() {
            return Err(RunError::Console(error));
        }
        Ok(())
    }

    /// Steps until the halt trap fires, returning the number of instructions executed.
    ///
    /// There is no step limit: a program that never reaches the warm-boot vector never returns.
    pub fn run(&mut self) -> Result<u64, RunError> {
        loop {
            self.step()?;
            if self.calls.is_halted() {
                return Ok(self.instructions);
            }
        }
    }

    pub fn is_halted(&self) -> bool {
        self.calls.is_halted()
    }
    pub fn instructions(&self) -> u64 {
        self.instructions
    }
    pub fn cpu(&self) -> &C {
        &self.cpu
    }
    pub fn into_console(self) -> W {
        self.calls.into_console()
    }
}

/// Runs `image` on a fresh [`Z80`] with 64 KiB of RAM, writing its console output to `console`.
pub fn run_image<W: Write>(
    name: &str,
    image: &[u8],
    console: W,
    clock_hz: u64,
) -> Result<RunReport, RunError> {
    let mut driver = Driver::new(Z80::new(FlatMemory::new()), console);
    driver.load(image)?;
    tracing::info!(image = name, len = image.len(), "starting run");
    let started = Instant::now();
    let instructions = driver.run()?;
    let wall_time = started.elapsed();
    tracing::info!(image = name, instructions, ?wall_time, "halt trap reached");
    Ok(RunReport {
        name: name.to_string(),
        instructions,
        clock_hz,
        wall_time,
    })
}

/// Reads the image at `path` and runs it with [`run_image`].
pub fn run_file<W: Write>(path: &Path, console: W, clock_hz: u64) -> Result<RunReport, RunError> {
    let image = loader::read_image(path)?;
    run_image(&display_name(path), &image, console, clock_hz)
}

/// The file name of `path`, or the whole path if it has none.
pub fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
