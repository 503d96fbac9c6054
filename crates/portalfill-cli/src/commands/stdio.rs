//! JSON-lines host protocol.
//!
//! One request per line on stdin, one response per line on stdout. Status
//! updates for a request are written as `{"id":..,"status":{..}}` lines before
//! its response. EOF closes the browser and exits.

use anyhow::Result;
use portalfill_core::{
    AutomationSession, CollectRequest, FillRequest, StatusReporter, StatusUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Display;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::output::json::to_json_line;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum HostAction {
    Probe,
    Open {
        #[serde(default)]
        profile: Option<String>,
    },
    Fill(FillRequest),
    Collect(CollectRequest),
    Diagnose {
        #[serde(default)]
        profile: Option<String>,
    },
    Close,
}

#[derive(Debug, Deserialize)]
struct HostRequest {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    action: HostAction,
}

#[derive(Debug, Serialize)]
struct StatusLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a Value>,
    status: &'a StatusUpdate,
}

pub async fn run(session: AutomationSession, default_profile: Option<String>) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    info!("Serving host requests on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match parse_request(&line) {
            Ok(request) => {
                let id = request.id.clone();
                let body =
                    handle_request(&session, request, default_profile.as_deref(), &out_tx).await;
                with_id(id, body)
            }
            Err((id, err)) => {
                warn!("Rejected host request: {}", err);
                with_id(id, failure(format!("Invalid request: {err}")))
            }
        };
        let _ = out_tx.send(to_json_line(&response)?);
    }

    info!("Host closed stdin, shutting down");
    session.close().await;
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// On failure, returns whatever request id could be recovered.
fn parse_request(line: &str) -> std::result::Result<HostRequest, (Option<Value>, serde_json::Error)> {
    let value: Value = serde_json::from_str(line).map_err(|e| (None, e))?;
    let id = value.get("id").cloned();
    serde_json::from_value(value).map_err(|e| (id, e))
}

async fn handle_request(
    session: &AutomationSession,
    request: HostRequest,
    default_profile: Option<&str>,
    out: &mpsc::UnboundedSender<String>,
) -> Value {
    let profile_or_default =
        |profile: Option<String>| profile.or_else(|| default_profile.map(str::to_string));

    match request.action {
        HostAction::Probe => match session.probe_runtime().await {
            Ok(probe) => json!({ "ok": true, "probe": probe }),
            Err(e) => failure(e),
        },
        HostAction::Open { profile } => {
            match session.open(profile_or_default(profile).as_deref()).await {
                Ok(bound) => json!({
                    "ok": true,
                    "portalUrl": bound.portal_url,
                    "mapping": bound.mapping_path,
                }),
                Err(e) => failure(e),
            }
        }
        HostAction::Fill(mut fill) => {
            fill.profile = profile_or_default(fill.profile);
            let (reporter, forwarder) = forward_status(request.id.clone(), out.clone());
            let report = session.fill(fill, &reporter).await;
            drop(reporter);
            let _ = forwarder.await;
            to_value_or_failure(&report)
        }
        HostAction::Collect(mut collect) => {
            collect.profile = profile_or_default(collect.profile);
            let (reporter, forwarder) = forward_status(request.id.clone(), out.clone());
            let report = session.collect_episodes(collect, &reporter).await;
            drop(reporter);
            let _ = forwarder.await;
            to_value_or_failure(&report)
        }
        HostAction::Diagnose { profile } => {
            match session.diagnose(profile_or_default(profile).as_deref()).await {
                Ok(fields) => json!({ "ok": true, "fields": fields }),
                Err(e) => failure(e),
            }
        }
        HostAction::Close => {
            session.close().await;
            json!({ "ok": true })
        }
    }
}

fn forward_status(
    id: Option<Value>,
    out: mpsc::UnboundedSender<String>,
) -> (StatusReporter, tokio::task::JoinHandle<()>) {
    let (reporter, mut rx) = StatusReporter::channel();
    let forwarder = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let line = StatusLine {
                id: id.as_ref(),
                status: &update,
            };
            if let Ok(line) = to_json_line(&line) {
                let _ = out.send(line);
            }
        }
    });
    (reporter, forwarder)
}

fn failure(error: impl Display) -> Value {
    json!({ "ok": false, "error": error.to_string() })
}

fn to_value_or_failure<T: Serialize>(report: &T) -> Value {
    serde_json::to_value(report).unwrap_or_else(failure)
}

fn with_id(id: Option<Value>, mut body: Value) -> Value {
    if let (Some(id), Some(object)) = (id, body.as_object_mut()) {
        object.insert("id".to_string(), id);
    }
    body
}
