use std::{env, sync::Arc};

use aggregator::AggregatorService;
use anyhow::Context;
use log::info;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const INCLUDE_CURRENT_VAR: &str = "AGGREGATOR_INCLUDE_CURRENT";
const MAX_FRAME_LEN_VAR: &str = "AGGREGATOR_MAX_FRAME_LEN";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let model_path = args.next().context("usage: aggregator <model.npz> [addr]")?;
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let include_current = env::var(INCLUDE_CURRENT_VAR)
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let max_frame_len = match env::var(MAX_FRAME_LEN_VAR) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{MAX_FRAME_LEN_VAR} must be a byte count, got {value:?}"))?,
        Err(_) => aggregator::DEFAULT_MAX_FRAME_LEN,
    };

    let initial = tokio::fs::read(&model_path)
        .await
        .with_context(|| format!("reading initial model {model_path}"))?;
    let service = Arc::new(AggregatorService::new(initial, include_current)?);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let shutdown = CancellationToken::new();

    let server = aggregator::run(listener, service.clone(), max_frame_len, shutdown.clone());
    let control = aggregator::run_control(service, tokio::io::stdin(), tokio::io::stdout());

    tokio::select! {
        res = server => res?,
        res = control => {
            res?;
            info!("control input closed");
        }
        _ = signal::ctrl_c() => info!("interrupted"),
    }

    shutdown.cancel();
    Ok(())
}
