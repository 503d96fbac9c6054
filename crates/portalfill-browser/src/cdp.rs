//! Minimal DevTools protocol client: request/response correlation over one
//! WebSocket, events are dropped.

use anyhow::{Context, Result, anyhow, bail};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = std::result::Result<Value, String>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

pub struct CdpConnection {
    writer: tokio::sync::Mutex<SplitSink<WsStream, WsMessage>>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    call_timeout: Duration,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .with_context(|| format!("Failed to connect to DevTools endpoint {ws_url}"))?;
        debug!("Connected to DevTools endpoint {}", ws_url);

        let (writer, mut reader) = stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();

        let reader = tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        route_message(&reader_pending, text.as_str());
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("DevTools WebSocket error: {}", e);
                        break;
                    }
                }
            }
            // Dropping the senders fails every in-flight call.
            if let Ok(mut pending) = reader_pending.lock() {
                pending.clear();
            }
            debug!("DevTools connection closed");
        });

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            reader,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Send one protocol command and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| anyhow!("DevTools pending map poisoned"))?
            .insert(id, tx);

        let request = json!({ "id": id, "method": method, "params": params });
        trace!("-> {}", request);

        let sent = {
            let mut writer = self.writer.lock().await;
            writer
                .send(WsMessage::Text(request.to_string().into()))
                .await
        };
        if let Err(e) = sent {
            self.forget(id);
            bail!("Failed to send {method}: {e}");
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => bail!("{method} failed: {message}"),
            Ok(Err(_)) => bail!("DevTools connection closed during {method}"),
            Err(_) => {
                self.forget(id);
                bail!(
                    "{method} timed out after {} seconds",
                    self.call_timeout.as_secs()
                )
            }
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Deliver a response to its waiting caller. Returns `false` for events and
/// responses nobody is waiting for.
fn route_message(pending: &PendingMap, text: &str) -> bool {
    let Ok(payload) = serde_json::from_str::<Value>(text) else {
        return false;
    };
    let Some(id) = payload.get("id").and_then(Value::as_u64) else {
        trace!("<- event {}", payload["method"].as_str().unwrap_or("?"));
        return false;
    };

    let Some(sender) = pending.lock().ok().and_then(|mut map| map.remove(&id)) else {
        return false;
    };

    let reply = match payload.get("error") {
        Some(error) => Err(error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())),
        None => Ok(payload.get("result").cloned().unwrap_or(Value::Null)),
    };
    sender.send(reply).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_with(id: u64) -> (PendingMap, oneshot::Receiver<Reply>) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(id, tx);
        (pending, rx)
    }

    #[tokio::test]
    async fn routes_result_to_waiting_caller() {
        let (pending, rx) = pending_with(7);
        assert!(route_message(
            &pending,
            r#"{"id":7,"result":{"result":{"value":"ok"}}}"#
        ));
        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply["result"]["value"], json!("ok"));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn routes_protocol_error_message() {
        let (pending, rx) = pending_with(3);
        route_message(
            &pending,
            r#"{"id":3,"error":{"code":-32000,"message":"No node with given id"}}"#,
        );
        assert_eq!(rx.await.unwrap().unwrap_err(), "No node with given id");
    }

    #[test]
    fn events_and_unknown_ids_are_ignored() {
        let (pending, _rx) = pending_with(1);
        assert!(!route_message(
            &pending,
            r#"{"method":"Page.frameNavigated","params":{}}"#
        ));
        assert!(!route_message(&pending, r#"{"id":99,"result":{}}"#));
        assert!(!route_message(&pending, "not json"));
        assert_eq!(pending.lock().unwrap().len(), 1);
    }
}
