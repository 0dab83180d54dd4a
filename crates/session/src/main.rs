// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use unisched_session::config::SessionConfig;

#[tokio::main]
async fn main() {
    let config = SessionConfig::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }

    unisched_session::init_tracing(&config);

    if let Err(e) = unisched_session::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
