//! Assembles a source file and steps it until it halts, faults or runs out
//! of its step budget.
//!
//! ```text
//! cargo run --example run -- demos/programs/countdown.asm [budget] [--dump]
//! ```

use std::env;

use asm16::{Processor, Program};
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Steps allowed before the program is assumed to loop forever
const DEFAULT_BUDGET: usize = 10_000;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .wrap_err("failed to install logger")?; // logging

    let mut dump = false;
    let mut positional = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--dump" {
            dump = true;
        } else {
            positional.push(arg);
        }
    }

    let path = positional
        .get(0)
        .ok_or_else(|| eyre!("usage: run <file.asm> [budget] [--dump]"))?;
    let budget = match positional.get(1) {
        Some(budget) => budget
            .parse::<usize>()
            .wrap_err_with(|| format!("invalid step budget `{}`", budget))?,
        None => DEFAULT_BUDGET,
    };

    let program = Program::from_file(path)?;
    log::info!("Loaded {} instructions from {}", program.instructions.len(), path);

    let mut cpu = Processor::from(program);
    let mut steps = 0;
    while !cpu.is_halted() {
        if steps == budget {
            bail!("no HLT after {} steps, giving up", budget);
        }
        if let Some(fault) = cpu.step() {
            bail!("{}", fault);
        }
        steps += 1;
    }

    for value in cpu.output() {
        log::info!("OUT {}", value);
    }
    log::info!(
        "Program halted after {} steps. Registers: {:?}",
        steps,
        cpu.registers()
    );
    if dump {
        cpu.memory().dump();
    }

    Ok(())
}
