//! Stdio-subprocess and HTTP/SSE transports for the MCP connection manager
//! (§6 "MCP transports").

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::acp::error::{AcpError, Result};
use crate::acp::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Framed JSON-RPC request/response over an arbitrary byte-stream transport.
/// Both `Connect`'s `initialize`/`list-tools` and `CallTool`'s `call-tool`
/// go through [`McpTransport::call`].
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn call(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse>;

    /// Best-effort teardown; called under the 5 s disconnect timeout (§4.1).
    async fn close(&self) -> Result<()>;
}

fn next_request_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Spawns `command <args...>` with the resolved environment and speaks
/// newline-delimited JSON-RPC over its stdin/stdout.
pub struct StdioTransport {
    child: Mutex<Child>,
    stdin: Mutex<tokio::process::ChildStdin>,
    stdout: Mutex<BufReader<tokio::process::ChildStdout>>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        if command.trim().is_empty() {
            return Err(AcpError::SpecInvalid("stdio MCPServer with empty command".to_string()));
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AcpError::Transport(format!("failed to spawn MCP server process: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AcpError::Transport("failed to acquire MCP server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AcpError::Transport("failed to acquire MCP server stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = String::new();
                while let Ok(n) = reader.read_line(&mut line).await {
                    if n == 0 {
                        break;
                    }
                    tracing::debug!(line = line.trim(), "mcp server stderr");
                    line.clear();
                }
            });
        }

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn call(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(next_request_id(), method, params);
        let payload = serde_json::to_string(&request)?;

        let mut stdin = self.stdin.lock().await;
        let mut stdout = self.stdout.lock().await;

        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| AcpError::Transport(format!("failed writing to MCP server: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| AcpError::Transport(format!("failed writing newline to MCP server: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| AcpError::Transport(format!("failed flushing MCP server stdin: {e}")))?;

        let mut line = String::new();
        let n = stdout
            .read_line(&mut line)
            .await
            .map_err(|e| AcpError::Transport(format!("failed reading from MCP server: {e}")))?;
        if n == 0 {
            return Err(AcpError::Transport("MCP server closed the connection".to_string()));
        }

        Ok(serde_json::from_str(line.trim())?)
    }

    async fn close(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        Ok(())
    }
}

/// HTTP/SSE transport: one POST per JSON-RPC call, session continuity
/// carried by an `Mcp-Session-Id` response header echoed on later requests.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    session_id: tokio::sync::RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            session_id: tokio::sync::RwLock::new(None),
        }
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn call(&self, method: &str, params: Option<serde_json::Value>) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(next_request_id(), method, params);

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(session) = self.session_id.read().await.as_ref() {
            builder = builder.header("Mcp-Session-Id", session);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AcpError::Transport(format!("MCP HTTP request failed: {e}")))?;

        if let Some(session) = response.headers().get("Mcp-Session-Id") {
            if let Ok(session_str) = session.to_str() {
                *self.session_id.write().await = Some(session_str.to_string());
            }
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AcpError::Transport(format!("MCP HTTP error {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AcpError::Transport(format!("failed reading MCP HTTP response: {e}")))?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
