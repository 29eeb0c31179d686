use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, TerminalSize};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::server::Server;

#[derive(Deserialize)]
struct ResizeMessage {
    #[serde(rename = "type")]
    kind: String,
    cols: u16,
    rows: u16,
}

pub async fn terminal_upgrade(
    State(server): State<Server>,
    Path((namespace, name)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let pod_name = server.resolve_pod_name(&namespace, &name).await?;
    let shell = server.config.shell.command.clone();
    let client = server.client.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(err) = bridge(socket, client, namespace, pod_name, shell).await {
            warn!(%err, "terminal session ended with error");
        }
    }))
}

async fn bridge(
    socket: WebSocket,
    client: crate::client::Client,
    namespace: String,
    pod_name: String,
    shell: Vec<String>,
) -> anyhow::Result<()> {
    let pods: Api<Pod> = Api::namespaced(client.kube.clone(), &namespace);
    let command: Vec<&str> = shell.iter().map(String::as_str).collect();
    let params = AttachParams::default().stdin(true).stdout(true).stderr(false).tty(true);
    let mut attached = pods.exec(&pod_name, command, &params).await?;

    let mut pod_stdin = attached.stdin().ok_or_else(|| anyhow::anyhow!("no stdin stream"))?;
    let mut pod_stdout = attached.stdout().ok_or_else(|| anyhow::anyhow!("no stdout stream"))?;
    let resize_tx = attached.terminal_size().ok_or_else(|| anyhow::anyhow!("no resize channel"))?;

    let (mut ws_sink, mut ws_stream) = socket.split();
    let cancel = CancellationToken::new();

    let (resize_watch_tx, mut resize_watch_rx) = watch::channel::<Option<TerminalSize>>(None);

    let read_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            tokio::select! {
                _ = read_cancel.cancelled() => break,
                result = pod_stdout.read(&mut buf) => {
                    match result {
                        Ok(0) => break,
                        Ok(n) => {
                            if ws_sink.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        }
        read_cancel.cancel();
        let _ = ws_sink.close().await;
    });

    let write_cancel = cancel.clone();
    let mut resize_tx_loop = resize_tx;
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = write_cancel.cancelled() => break,
                changed = resize_watch_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let size = resize_watch_rx.borrow().as_ref().map(|s| TerminalSize { width: s.width, height: s.height });
                    if let Some(size) = size {
                        let _ = resize_tx_loop.send(size);
                    }
                }
                message = ws_stream.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            if pod_stdin.write_all(&data).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(resize) = serde_json::from_str::<ResizeMessage>(&text) {
                                if resize.kind == "resize" && resize.cols > 0 && resize.rows > 0 {
                                    let _ = resize_watch_tx.send(Some(TerminalSize {
                                        height: resize.rows,
                                        width: resize.cols,
                                    }));
                                    continue;
                                }
                            }
                            if pod_stdin.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    }
                }
            }
        }
        write_cancel.cancel();
        let _ = pod_stdin.shutdown().await;
    });

    let _ = tokio::join!(reader, writer);
    attached.join().await.ok();
    info!(namespace = %namespace, pod = %pod_name, "terminal session closed");
    Ok(())
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Upstream(err)
    }
}
