use std::net::SocketAddr;

use kube::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    config::OperatorConfig,
    controller::run_controller,
    crd::Registry,
    web::run_http_server,
    webhook::WebhookState,
};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &OperatorConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

/// Spawn the Kubernetes controller loop.
pub fn spawn_controller(
    client: Client,
    cfg: OperatorConfig,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controller(client, cfg, cancel).await })
}

/// Spawn the webhook and health server on the provided address.
pub fn spawn_http(
    addr: SocketAddr,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    let state = WebhookState::new(Registry::new());
    tokio::spawn(async move { run_http_server(addr, state, cancel).await })
}

/// Cancel `cancel` on Ctrl-C.
pub fn spawn_shutdown_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        cancel.cancel();
    });
}

/// Start both controller and HTTP services and wait until both finish.
pub async fn run_all(client: Client, cfg: OperatorConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    spawn_shutdown_signal(cancel.clone());
    let http_addr = compute_http_addr(&cfg);

    let controller = spawn_controller(client, cfg, cancel.clone());
    let http = spawn_http(http_addr, cancel.clone());

    let (c_res, h_res) = tokio::join!(
        stop_on_exit(controller, cancel.clone()),
        stop_on_exit(http, cancel),
    );
    c_res?;
    h_res?;
    Ok(())
}

/// Either service exiting stops the other.
async fn stop_on_exit(
    task: JoinHandle<anyhow::Result<()>>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let res = task.await;
    cancel.cancel();
    res?
}
