//! Command line driver for the instruction scheduler.
//!
//! Reads methods in the textual HIR format from a file (or stdin), schedules
//! them and prints the result.

use clap::Parser as ClapParser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tpde_sched::ir::{Graph, InstructionSet};
use tpde_sched::scheduler::{InstructionScheduling, SchedulerOptions};
use tpde_sched::SchedulingStats;

#[derive(ClapParser)]
#[command(name = "tpde-sched", about = "Schedule the instructions of HIR methods")]
struct Cli {
    /// Input file, stdin when absent
    input: Option<PathBuf>,

    /// Target instruction set
    #[arg(long, default_value = "arm64", value_parser = parse_isa)]
    isa: InstructionSet,

    /// Schedule every block, not only loop blocks
    #[arg(long)]
    all_blocks: bool,

    /// Pick candidates at random
    #[arg(long)]
    random: bool,

    /// Seed for --random
    #[arg(long, requires = "random")]
    seed: Option<u64>,

    /// Append the dependency graph of each scheduled block to this file
    #[arg(long)]
    dump_dot: Option<PathBuf>,
}

fn parse_isa(name: &str) -> Result<InstructionSet, String> {
    InstructionSet::from_name(name).ok_or_else(|| format!("unknown instruction set '{}'", name))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let text = match &cli.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let options = SchedulerOptions {
        only_optimize_loop_blocks: !cli.all_blocks,
        schedule_randomly: cli.random,
        random_seed: cli.seed,
        dump_dot: cli.dump_dot,
    };
    let pass = InstructionScheduling::new(cli.isa, options)?;

    let mut total = SchedulingStats::default();
    for mut graph in Graph::parse_all(&text)? {
        total.merge(&pass.run(&mut graph)?);
        print!("{}", graph);
    }
    log::info!("{}", total);
    Ok(())
}
