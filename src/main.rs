//! Runs CP/M test images (ZEXDOC, ZEXALL) on the [`Z80`](zex_harness::Z80) with the BDOS traps
//! in place and reports how long each would take on real hardware.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    thread,
};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use zex_harness::{CLOCK_HZ, RunError, RunReport, driver::display_name, run_file};

#[derive(Parser, Debug)]
#[command(
    name = "zex-harness",
    version,
    about = "Run CP/M Z80 conformance images with trapped BDOS calls",
    long_about = "Loads each image at 0x0100, traps BDOS calls 2 and 9 and the warm-boot vector, \
                  and runs until the program warm-boots.\n\nThe bundled Z80 covers only the \
                  unprefixed opcodes, so ZEXDOC and ZEXALL stop at their first CB/DD/ED/FD \
                  instruction; completing them needs a full Z80 Cpu implementation.\n\n\
                  Examples:\n  zex-harness hello.com\n  \
                  zex-harness --parallel first.com second.com\n\nSet RUST_LOG (e.g. \
                  RUST_LOG=zex_harness=trace) for diagnostics on stderr."
)]
struct Cli {
    /// CP/M `.com` images to run, each on a fresh CPU.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Clock rate used to turn the instruction count into emulated time.
    #[arg(long, default_value_t = CLOCK_HZ, value_parser = clap::value_parser!(u64).range(1..))]
    clock_hz: u64,

    /// Run every image on its own thread, printing each transcript when its run finishes.
    #[arg(long)]
    parallel: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();
    let passed = if cli.parallel {
        run_parallel(&cli.images, cli.clock_hz, &mut stdout)
    } else {
        run_sequential(&cli.images, cli.clock_hz, &mut stdout)
    };
    if passed.iter().all(|&ok| ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Runs each image in turn, its console and then its report going straight to `out`.
fn run_sequential<W: Write>(images: &[PathBuf], clock_hz: u64, out: &mut W) -> Vec<bool> {
    images
        .iter()
        .map(|image| {
            announce(out, image);
            let outcome = run_file(image, &mut *out, clock_hz);
            report(out, image, outcome)
        })
        .collect()
}

/// Runs every image at once, buffering each console transcript until its run ends.
fn run_parallel<W: Write>(images: &[PathBuf], clock_hz: u64, out: &mut W) -> Vec<bool> {
    thread::scope(|scope| {
        let handles: Vec<_> = images
            .iter()
            .map(|image| {
                scope.spawn(move || {
                    let mut transcript = Vec::new();
                    let outcome = run_file(image, &mut transcript, clock_hz);
                    (image, transcript, outcome)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                let (image, transcript, outcome) = handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                announce(out, image);
                if let Err(error) = out.write_all(&transcript).and_then(|()| out.flush()) {
                    tracing::warn!(
                        image = %image.display(),
                        %error,
                        "couldn't write the console transcript"
                    );
                }
                report(out, image, outcome)
            })
            .collect()
    })
}

fn announce<W: Write>(out: &mut W, image: &Path) {
    let announced =
        writeln!(out, "Testing {}...", display_name(image)).and_then(|()| out.flush());
    if let Err(error) = announced {
        tracing::warn!(image = %image.display(), %error, "couldn't write to stdout");
    }
}

/// Prints the report of a finished run, or logs why it failed. Returns whether the run passed.
fn report<W: Write>(out: &mut W, image: &Path, outcome: Result<RunReport, RunError>) -> bool {
    match outcome {
        Ok(report) => {
            if let Err(error) = writeln!(out, "\n{report}\n").and_then(|()| out.flush()) {
                tracing::warn!(image = %image.display(), %error, "couldn't write the report");
            }
            true
        }
        Err(error) => {
            tracing::error!(image = %image.display(), "{}", error_chain(&error));
            false
        }
    }
}

/// Formats an error followed by each of its sources.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
