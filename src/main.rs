// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use keel_rs::keel::config::{parse_arg, RunConfig};
use keel_rs::kit::process::ShellRunner;
use keel_rs::kit::reference::DockerReferenceNormalizer;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Manifest files or directories holding one
    manifests: Vec<PathBuf>,

    /// Echo every command instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Default `args` for tasks that declare none, repeatable
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_arg)]
    args: Vec<(String, String)>,

    /// Passed through to build and command invocations
    #[arg(last = true)]
    extra_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RunConfig::resolve(args.manifests, args.dry_run, args.extra_args)
        .with_default_args(args.args);

    let result = keel_rs::keel::run(
        &config,
        Arc::new(ShellRunner::new()),
        &DockerReferenceNormalizer::new(),
    )
    .await;
    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_fatal() => {
            log::error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Run aborted"),
    };

    let Some(report) = report else {
        return Ok(());
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Can't serialize run report")?
        );
    } else {
        println!("{}", report.render());
    }

    std::process::exit(report.exit_code());
}
