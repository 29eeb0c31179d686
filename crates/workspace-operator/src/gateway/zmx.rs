use serde::Serialize;

use crate::client::Client;
use crate::config::TerminalSessionMode;

#[derive(Debug, Clone, Serialize)]
pub struct SessionsInfo {
    pub mode: &'static str,
    pub available: bool,
    pub default_session: String,
    pub sessions: Vec<String>,
}

pub fn default_session_id(namespace: &str, name: &str) -> String {
    format!("workspace:{namespace}:{name}")
}

/// Detects whether `zmx` is installed in the pod, and if so lists its
/// active sessions. Detection and listing both go through a one-shot exec,
/// the same mechanism the original operator used for its idle-connection
/// probe.
pub async fn sessions_info(
    client: &Client,
    namespace: &str,
    pod_name: &str,
    mode: TerminalSessionMode,
) -> SessionsInfo {
    let default_session = default_session_id(namespace, pod_name);
    if mode != TerminalSessionMode::Zmx {
        return SessionsInfo {
            mode: "plain",
            available: false,
            default_session,
            sessions: vec![],
        };
    }

    let has_zmx = client
        .pod_exec_stdout(namespace, pod_name, vec!["sh", "-c", "command -v zmx"])
        .await
        .map(|out| !out.trim().is_empty())
        .unwrap_or(false);

    if !has_zmx {
        return SessionsInfo {
            mode: "zmx",
            available: false,
            default_session,
            sessions: vec![],
        };
    }

    let sessions = client
        .pod_exec_stdout(namespace, pod_name, vec!["zmx", "list"])
        .await
        .map(|out| out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    SessionsInfo {
        mode: "zmx",
        available: true,
        default_session,
        sessions,
    }
}

/// The effective shell command, wrapping it in `zmx attach` when enabled.
pub fn effective_command(mode: TerminalSessionMode, namespace: &str, pod_name: &str, base_shell: &[String]) -> Vec<String> {
    match mode {
        TerminalSessionMode::Plain => base_shell.to_vec(),
        TerminalSessionMode::Zmx => {
            let mut cmd = vec!["zmx".to_string(), "attach".to_string(), default_session_id(namespace, pod_name)];
            cmd.extend(base_shell.iter().cloned());
            cmd
        }
    }
}
