/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use clap::Parser;
use load_framework::{anyhow, rustls};
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::Commands;

const DEFAULT_LOG_FILTER: &str = "loadoperator=INFO,load_framework=INFO,WARN";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The log filter to use, e.g. `debug` or `load_framework=trace`. `LOADOPERATOR_LOG` takes precedence.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    subcommand: Commands,
}

fn init_tracing(trace_config: Option<&str>) {
    let filter = match (trace_config, std::env::var("LOADOPERATOR_LOG").ok()) {
        (_, Some(log)) => EnvFilter::new(log),
        (Some(level), None) => EnvFilter::new(level),
        _ => EnvFilter::new(DEFAULT_LOG_FILTER),
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    );
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.subcommand {
        Commands::Run(args) => commands::run::run(&args).await?,
        Commands::Invoke(args) => commands::invoke::run(&args).await?,
        Commands::MockServer(args) => commands::mock::run(&args).await?,
        Commands::Export(args) => commands::export(&args)?,
    }

    Ok(())
}
