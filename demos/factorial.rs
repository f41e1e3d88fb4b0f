use asm16::{assemble, Processor};
use color_eyre::eyre::{Result, WrapErr};
use log::LevelFilter;
use simple_logger::SimpleLogger;

const SOURCE: &str = include_str!("programs/factorial.asm");

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .init()
        .wrap_err("failed to install logger")?; // logging

    let program = assemble(SOURCE)?;
    print!("{}", program.listing());

    let mut cpu = Processor::from(program);
    while !cpu.is_halted() {
        if let Some(fault) = cpu.step() {
            return Err(fault.into());
        }
    }

    println!("Program terminated. Output: {:?}", cpu.output());

    Ok(())
}
