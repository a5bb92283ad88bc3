use std::{io, path::PathBuf, process};

use anyhow::Context;
use fedsim::{
    logger::{JsonLinesLogger, NoopLogger, ScalarLogger},
    settings::{Settings, SimulationSettings},
    simulation,
};
use structopt::StructOpt;
use tracing_subscriber::*;

#[macro_use]
extern crate tracing;

#[derive(Debug, StructOpt)]
#[structopt(name = "fedsim")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,
}

fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(settings.log.filter)
        .with_ansi(true)
        .init();

    if let Err(err) = run(settings.simulation, settings.output.scalars) {
        error!("{:?}", err);
        process::exit(1);
    }
}

fn run(
    simulation: SimulationSettings,
    scalars: Option<PathBuf>,
) -> anyhow::Result<()> {
    let logger: Box<dyn ScalarLogger> = match scalars {
        Some(path) => Box::new(
            JsonLinesLogger::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(NoopLogger),
    };

    let report = simulation::run(&simulation, logger).context("simulation failed")?;
    if let Some(last) = report.last() {
        info!(
            seed = report.seed,
            round = last.round,
            train_loss = last.train_loss,
            test_loss = last.test_loss,
            "final model"
        );
    }

    serde_json::to_writer_pretty(io::stdout(), &report).context("failed to print the report")?;
    println!();
    Ok(())
}
