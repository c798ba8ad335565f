use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod dataset;
mod error;
mod evaluation;
mod judge;
mod models;
mod output;
mod runner;

use crate::config::{Config, ConfigArgs};
use crate::output::OutputFormat;
use crate::runner::Runner;

/// UCCB LLM-as-a-Judge evaluation - score a model's answers against reference answers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Console summary format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log every request instead of showing a progress bar
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("uccb_judge_eval={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("UCCB LLM-as-a-Judge evaluation");

    let config = Config::load(args.config)?;
    let runner = Runner::new(config, args.verbose);

    let report = runner.run().await?;

    output::print_summary(&report.summary, args.output);
    if let OutputFormat::Plain = args.output {
        println!("Detailed results saved to: {}", report.results_path.display());
    }
    info!(path = %report.results_path.display(), "Detailed results saved");

    Ok(())
}
