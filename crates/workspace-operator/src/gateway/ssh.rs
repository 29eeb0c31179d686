use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::SinkExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, TerminalSize};
use russh::server::{Auth, Handler, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use russh_keys::key::PublicKey as RusshPublicKey;
use russh_keys::PublicKeyBase64;
use ssh_key::certificate::CertType;
use ssh_key::Certificate;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

use crate::gateway::cert::parse_principal;
use crate::server::Server;

/// Runs the SSH gateway listener until cancellation. Accepts only
/// certificates signed by the configured CA and whose principal parses as
/// `prefix:namespace:name`; all shell I/O bridges through the same
/// platform exec subsystem the WebSocket PTY bridge uses.
pub async fn run(server: Server, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
    let ssh_config = &server.config.ssh;
    let host_key_path = ssh_config
        .host_key_path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("ssh.host_key_path is required to start the SSH gateway"))?;
    let host_key = russh_keys::load_secret_key(host_key_path, None)?;

    let ca_key_path = ssh_config
        .ca_key_path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("ssh.ca_key_path is required to start the SSH gateway"))?;
    let ca_public_key = ssh_key::PrivateKey::read_openssh_file(ca_key_path)?.public_key().clone();

    let config = Arc::new(russh::server::Config {
        keys: vec![host_key],
        ..Default::default()
    });

    let listen = ssh_config.listen;
    let mut handler_factory = GatewaySession { server, ca_public_key };

    info!(%listen, "ssh gateway listening");
    tokio::select! {
        result = handler_factory.run_on_address(config, listen) => result.map_err(Into::into),
        _ = shutdown.cancelled() => Ok(()),
    }
}

#[derive(Clone)]
struct GatewaySession {
    server: Server,
    ca_public_key: ssh_key::PublicKey,
}

impl russh::server::Server for GatewaySession {
    type Handler = GatewayHandler;

    fn new_client(&mut self, _addr: Option<std::net::SocketAddr>) -> Self::Handler {
        GatewayHandler {
            server: self.server.clone(),
            ca_public_key: self.ca_public_key.clone(),
            principal: None,
            channels: HashMap::new(),
        }
    }
}

struct ChannelHandles {
    resize_tx: tokio::sync::mpsc::UnboundedSender<TerminalSize>,
    stdin_tx: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
}

struct GatewayHandler {
    server: Server,
    ca_public_key: ssh_key::PublicKey,
    principal: Option<String>,
    channels: HashMap<ChannelId, ChannelHandles>,
}

#[async_trait]
impl Handler for GatewayHandler {
    type Error = anyhow::Error;

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &RusshPublicKey,
    ) -> Result<Auth, Self::Error> {
        let reject = Auth::Reject { proceed_with_methods: None };

        let blob = public_key.public_key_bytes();
        let certificate = match Certificate::from_bytes(&blob) {
            Ok(certificate) => certificate,
            Err(_) => return Ok(reject),
        };

        if certificate.cert_type() != CertType::User {
            return Ok(reject);
        }
        if certificate.signature_key() != self.ca_public_key.key_data() {
            return Ok(reject);
        }
        if certificate.verify_signature().is_err() {
            return Ok(reject);
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        if now < certificate.valid_after() || now > certificate.valid_before() {
            return Ok(reject);
        }

        let prefix = self.server.config.ssh.principal_prefix.clone();
        let principal = certificate
            .valid_principals()
            .iter()
            .find_map(|candidate| parse_principal(candidate, &prefix));

        match principal {
            Some((namespace, name)) => {
                self.principal = Some(format!("{namespace}:{name}"));
                Ok(Auth::Accept)
            }
            None => Ok(reject),
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let _ = (channel, session);
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = (channel, col_width, row_height, session);
        Ok(())
    }

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        let principal = self
            .principal
            .clone()
            .ok_or_else(|| anyhow::anyhow!("shell requested before authentication"))?;
        let mut parts = principal.splitn(2, ':');
        let namespace = parts.next().unwrap_or_default().to_string();
        let name = parts.next().unwrap_or_default().to_string();

        let (resize_tx, resize_rx) = tokio::sync::mpsc::unbounded_channel();
        let (stdin_tx, stdin_rx) = tokio::sync::mpsc::unbounded_channel();
        self.channels.insert(channel, ChannelHandles { resize_tx, stdin_tx });

        let server = self.server.clone();
        let handle = session.handle();
        tokio::spawn(async move {
            if let Err(err) = bridge_shell(server, namespace, name, channel, handle, resize_rx, stdin_rx).await {
                warn!(%err, "ssh shell session ended with error");
            }
        });

        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(handles) = self.channels.get(&channel) {
            let _ = handles.resize_tx.send(TerminalSize {
                width: col_width as u16,
                height: row_height as u16,
            });
        }
        Ok(())
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], _session: &mut Session) -> Result<(), Self::Error> {
        if let Some(handles) = self.channels.get(&channel) {
            let _ = handles.stdin_tx.send(data.to_vec());
        }
        Ok(())
    }
}

async fn bridge_shell(
    server: Server,
    namespace: String,
    name: String,
    channel_id: ChannelId,
    handle: russh::server::Handle,
    mut resize_rx: tokio::sync::mpsc::UnboundedReceiver<TerminalSize>,
    mut stdin_rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
) -> anyhow::Result<()> {
    let pod_name = server.resolve_pod_name(&namespace, &name).await?;
    let pods: Api<Pod> = Api::namespaced(server.client.kube.clone(), &namespace);
    let command: Vec<&str> = server.config.shell.command.iter().map(String::as_str).collect();
    let params = AttachParams::default().stdin(true).stdout(true).stderr(false).tty(true);
    let mut attached = pods.exec(&pod_name, command, &params).await?;

    let mut pod_stdin = attached.stdin().ok_or_else(|| anyhow::anyhow!("no stdin stream"))?;
    let mut pod_stdout = attached.stdout().ok_or_else(|| anyhow::anyhow!("no stdout stream"))?;
    let mut resize_tx = attached.terminal_size().ok_or_else(|| anyhow::anyhow!("no resize channel"))?;

    let mut buf = [0u8; 8192];
    loop {
        tokio::select! {
            resized = resize_rx.recv() => {
                match resized {
                    Some(size) => { let _ = resize_tx.send(size); }
                    None => break,
                }
            }
            input = stdin_rx.recv() => {
                match input {
                    Some(bytes) => {
                        if pod_stdin.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            result = pod_stdout.read(&mut buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        if handle.data(channel_id, buf[..n].to_vec().into()).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
    let _ = pod_stdin.shutdown().await;
    attached.join().await.ok();
    Ok(())
}
