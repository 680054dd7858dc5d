use clap::Parser;
use h5bigfile_cli::{Args, run};
use h5bigfile_log::{default_env_filter, setup_logger};
use log::info;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logger(default_env_filter(args.verbose));

    let report = run(&args)?;
    info!("{report}");
    Ok(())
}
