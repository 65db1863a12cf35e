use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use cascade_sim::{run_simulation, ClosedFormEngine};

#[derive(Debug, Parser)]
#[command(name = "cascade-sim")]
#[command(about = "Simulate noisy measurement data from true hierarchical disease rates")]
struct Cli {
    /// Directory holding option.csv, node.csv, covariate.csv,
    /// no_effect_rate.csv, multiplier_sim.csv, and simulate.csv.
    /// data_sim.csv and covariate_avg.csv are written next to them.
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run_simulation(&cli.dir, &ClosedFormEngine)?;
    println!(
        "wrote data_sim.csv and covariate_avg.csv in {}",
        cli.dir.display()
    );
    Ok(())
}
