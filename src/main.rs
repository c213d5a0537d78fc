// Copyright (c) 2024 Stagecraft Systems
// Licence: GNU GPLv3
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use single_instance::SingleInstance;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lumen_core::config::Config;
use lumen_core::LumenCore;

#[derive(Parser, Debug)]
#[command(name = "lumen-core", about = "Realtime lighting control core")]
struct Arguments {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "lumen-core.yaml")]
    config: PathBuf,

    /// Allow a second instance to start alongside an already-running one.
    #[arg(long)]
    allow_multiple: bool,
}

fn setup_logging(log_directory: &str) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_directory, "lumen-core.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    let file_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry().with(stdout_layer).with(file_layer).init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("using default configuration: failed to load {:?}: {e}", args.config);
            Config::default()
        }
    };

    let _log_guard = setup_logging(&config.log_directory);

    let instance = SingleInstance::new("lumen-core").context("single-instance check failed")?;
    if !args.allow_multiple && !instance.is_single() {
        error!("another instance of lumen-core is already running; pass --allow-multiple to override");
        anyhow::bail!("another instance is already running");
    }

    let core = LumenCore::start(&config).await.context("failed to start lumen-core")?;

    info!("lumen-core is running; press ctrl-c to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }

    core.shutdown().await;
    Ok(())
}
