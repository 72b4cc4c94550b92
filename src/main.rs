use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;

use memvis::{MonitorApp, Settings};

#[derive(Parser, Debug)]
#[command(name = "memvis", version, about = "Record and chart the memory of build daemons")]
struct Cli {
    /// JSON settings file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the sampler in the background
    Start(SampleArgs),
    /// Run the sampler in the foreground until interrupted
    Sample(SampleArgs),
    /// Stop the sampler and publish the chart, diagram and summary
    Cleanup(CleanupArgs),
}

#[derive(clap::Args, Debug)]
struct SampleArgs {
    /// Seconds between samples
    #[arg(short, long)]
    interval: Option<u64>,

    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long)]
    pid_file: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct CleanupArgs {
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Directory for the chart and diagram files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Markdown file the report is appended to (stdout if unset)
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    summary_file: Option<PathBuf>,
}

impl SampleArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(interval) = self.interval {
            settings.interval_secs = interval;
        }
        if let Some(path) = &self.log_file {
            settings.log_file = path.clone();
        }
        if let Some(path) = &self.pid_file {
            settings.pid_file = path.clone();
        }
    }
}

impl CleanupArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.log_file {
            settings.log_file = path.clone();
        }
        if let Some(path) = &self.pid_file {
            settings.pid_file = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match &cli.command {
        Command::Start(args) => {
            args.apply(&mut settings);
            let program = std::env::current_exe().context("locating the memvis executable")?;
            MonitorApp::new(settings, cli.config.clone())
                .start(&program)
                .context("starting the memory monitor")?;
        }
        Command::Sample(args) => {
            args.apply(&mut settings);
            MonitorApp::new(settings, cli.config.clone())
                .sample()
                .context("sampling")?;
        }
        Command::Cleanup(args) => {
            args.apply(&mut settings);
            MonitorApp::new(settings, cli.config.clone())
                .cleanup(args.summary_file.as_deref())
                .context("producing the memory report")?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
