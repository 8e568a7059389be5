//! 冠脉钙化评分批处理.

mod cli;
mod reference;
mod result;
mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("failed to install logger")?;

    let result = runner::run(&cli)?;
    result.analyze().context("failed to print summary")
}
