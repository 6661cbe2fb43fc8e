//! MCP client over a subprocess stdio transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use helpdesk_ai::ToolDescriptor;

use crate::{protocol, McpError, ToolProvider, NO_TOOL_RESULT};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// A connection to one MCP server subprocess.
///
/// The child is spawned with `kill_on_drop`, so even a cancelled request
/// cannot leak the subprocess; `close` is the orderly path.
#[derive(Debug)]
pub struct McpClient {
    child: Child,
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    stderr_drain: JoinHandle<()>,
    timeout: Duration,
}

impl McpClient {
    /// Spawn the provider and perform the initialize handshake.
    ///
    /// Fails with a handshake error if the provider does not respond
    /// within `timeout`.
    pub async fn connect(
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Spawn(format!("{command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Spawn("provider stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Spawn("provider stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::Spawn("provider stderr unavailable".into()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_responses(stdout, pending.clone()));
        let stderr_drain = tokio::spawn(drain_stderr(stderr));

        let client = Self {
            child,
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            reader,
            stderr_drain,
            timeout,
        };

        if let Err(e) = client.handshake().await {
            client.close().await;
            return Err(McpError::Handshake(e.to_string()));
        }

        Ok(client)
    }

    async fn handshake(&self) -> Result<(), McpError> {
        self.request("initialize", protocol::initialize_params())
            .await?;
        self.send_line(&protocol::notification("notifications/initialized"))
            .await
    }

    /// Request the provider's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let result = self.request("tools/list", serde_json::json!({})).await?;
        Ok(protocol::parse_tool_catalog(&result))
    }

    /// Invoke a named tool, absorbing failures into the returned text.
    pub async fn call_tool(&self, name: &str, args: &Value) -> String {
        match self
            .request("tools/call", protocol::call_params(name, args))
            .await
        {
            Ok(result) => protocol::first_text_content(&result)
                .unwrap_or_else(|| NO_TOOL_RESULT.to_string()),
            Err(e) => {
                error!(tool = name, error = %e, "Tool call failed");
                format!("Error calling tool {name}: {e}")
            }
        }
    }

    /// Release the connection: stop the I/O tasks and kill the subprocess.
    pub async fn close(mut self) {
        self.reader.abort();
        self.stderr_drain.abort();
        if let Err(e) = self.child.start_kill() {
            debug!("Provider process already exited: {e}");
        }
        let _ = self.child.wait().await;
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send_line(&protocol::request(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(err) = response.get("error") {
                    let message = err["message"].as_str().unwrap_or("unknown provider error");
                    return Err(McpError::Provider(message.to_string()));
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
            Ok(Err(_)) => Err(McpError::Transport(format!(
                "provider closed the connection during {method}"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout(method.to_string()))
            }
        }
    }

    async fn send_line(&self, message: &Value) -> Result<(), McpError> {
        let mut line =
            serde_json::to_string(message).map_err(|e| McpError::Transport(e.to_string()))?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }
}

/// Route incoming responses to their waiting requests by id.
async fn read_responses(stdout: ChildStdout, pending: PendingMap) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let message: Value = match serde_json::from_str(&line) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!("Skipping non-JSON provider output: {e}");
                        continue;
                    }
                };
                match message["id"].as_u64() {
                    Some(id) => {
                        if let Some(waiter) = pending.lock().await.remove(&id) {
                            let _ = waiter.send(message);
                        } else {
                            warn!(id, "Response for unknown request id");
                        }
                    }
                    None => {
                        debug!(method = %message["method"], "Provider notification");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Provider stdout read error: {e}");
                break;
            }
        }
    }
}

/// Keep the provider's stderr from filling up and surface it in the logs.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "helpdesk_mcp::provider", "{line}");
    }
}

#[async_trait]
impl ToolProvider for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(&self, name: &str, args: &Value) -> String {
        McpClient::call_tool(self, name, args).await
    }

    async fn close(self) {
        McpClient::close(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}"#;

    /// Spawn a scripted provider: a shell loop answering each request in
    /// order. The client's request ids are sequential starting at 1
    /// (initialize, then one id per request).
    async fn connect_scripted(script: &str) -> Result<McpClient, McpError> {
        McpClient::connect(
            "sh",
            &["-c".to_string(), script.to_string()],
            Duration::from_secs(5),
        )
        .await
    }

    #[tokio::test]
    async fn lists_tools_and_calls_one() {
        let script = format!(
            r#"read _
echo '{INIT_RESPONSE}'
read _
read _
echo '{{"jsonrpc":"2.0","id":2,"result":{{"tools":[{{"name":"search_docs","description":"Search the docs","inputSchema":{{"type":"object","additionalProperties":false}}}}]}}}}'
read _
echo '{{"jsonrpc":"2.0","id":3,"result":{{"content":[{{"type":"text","text":"Docs result"}}]}}}}'
"#
        );
        let client = connect_scripted(&script).await.unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search_docs");

        let answer = client
            .call_tool("search_docs", &serde_json::json!({"q": "test case"}))
            .await;
        assert_eq!(answer, "Docs result");

        client.close().await;
    }

    #[tokio::test]
    async fn malformed_catalog_is_empty_list() {
        let script = format!(
            r#"read _
echo '{INIT_RESPONSE}'
read _
read _
echo '{{"jsonrpc":"2.0","id":2,"result":{{}}}}'
"#
        );
        let client = connect_scripted(&script).await.unwrap();
        let tools = client.list_tools().await.unwrap();
        assert!(tools.is_empty());
        client.close().await;
    }

    #[tokio::test]
    async fn tool_error_is_absorbed_into_text() {
        let script = format!(
            r#"read _
echo '{INIT_RESPONSE}'
read _
read _
echo '{{"jsonrpc":"2.0","id":2,"error":{{"code":-32000,"message":"connection reset"}}}}'
"#
        );
        let client = connect_scripted(&script).await.unwrap();
        let answer = client
            .call_tool("search_docs", &serde_json::json!({"q": "x"}))
            .await;
        assert_eq!(answer, "Error calling tool search_docs: connection reset");
        client.close().await;
    }

    #[tokio::test]
    async fn tool_result_without_text_uses_sentinel() {
        let script = format!(
            r#"read _
echo '{INIT_RESPONSE}'
read _
read _
echo '{{"jsonrpc":"2.0","id":2,"result":{{"content":[{{"type":"image","data":"aGk="}}]}}}}'
"#
        );
        let client = connect_scripted(&script).await.unwrap();
        let answer = client.call_tool("screenshot", &serde_json::json!({})).await;
        assert_eq!(answer, NO_TOOL_RESULT);
        client.close().await;
    }

    #[tokio::test]
    async fn connect_times_out_when_provider_is_silent() {
        let err = McpClient::connect(
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Handshake(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn connect_fails_for_missing_command() {
        let err = McpClient::connect(
            "definitely-not-a-real-command-7f3a",
            &[],
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::Spawn(_)), "got {err:?}");
    }
}
