use std::env;

use anyhow::Context;
use log::info;
use orchestrator::{Orchestrator, configs::OrchestratorConfig};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: orchestrator [config.json] [clients]";

fn parse_args() -> anyhow::Result<OrchestratorConfig> {
    let mut config = None;
    let mut clients = None;

    for arg in env::args().skip(1) {
        match arg.parse::<usize>() {
            Ok(n) if clients.is_none() => clients = Some(n),
            Err(_) if config.is_none() => config = Some(OrchestratorConfig::load(&arg)?),
            _ => anyhow::bail!("unexpected argument {arg:?}\n{USAGE}"),
        }
    }

    let mut config = config.unwrap_or_default();
    if let Some(clients) = clients {
        config.clients = clients;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = parse_args()?;
    info!(
        group = config.group.as_str(),
        clients = config.clients;
        "starting orchestrator"
    );

    let orchestrator = Orchestrator::bind(config)
        .await
        .context("failed to start orchestrator")?;

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c");
        }
        stop.cancel();
    });

    orchestrator.run(shutdown).await?;
    info!("orchestrator stopped");
    Ok(())
}
