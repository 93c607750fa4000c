//! JSON-lines message transport
//!
//! One inbound message per input line:
//!
//!   { "origin": "panel", "name": "getPanelData", "messageId": "m-1", "sender": { "tabId": 4 } }
//!
//! One outbound record per output line, tagged by `kind`:
//!
//!   { "kind": "reply", "name": "getPanelData", "messageId": "m-1", "reply": { "type": "ok", "data": {...} } }
//!   { "kind": "followUp", "destination": { "tab": 4 }, "name": "processC2P", "messageId": "m-2", "reply": {...} }

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_core::{FollowUp, InboundMessage, Reply, SenderContext};
use warden_router::{MessageRouter, Responder};

/// How long pending async replies may take once input has ended.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: InboundMessage,
    #[serde(default)]
    pub sender: SenderContext,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outbound {
    Reply {
        name: String,
        #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        reply: Reply,
    },
    FollowUp(FollowUp),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub received: usize,
    pub rejected: usize,
    pub pending: usize,
}

/// Read messages until EOF or `shutdown`, dispatching each through `router`.
pub async fn serve<R, W>(
    router: &MessageRouter,
    input: R,
    output: W,
    mut follow_ups: Option<mpsc::UnboundedReceiver<FollowUp>>,
    shutdown: CancellationToken,
) -> anyhow::Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(write_lines(output, out_rx));

    let mut stats = ServeStats::default();
    let mut lines = input.lines();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested");
                break;
            }
            Some(follow_up) = next_follow_up(&mut follow_ups) => {
                let _ = out_tx.send(Outbound::FollowUp(follow_up));
            }
            line = lines.next_line() => match line? {
                Some(line) => handle_line(router, &line, &out_tx, &mut stats),
                None => {
                    debug!("input closed");
                    break;
                }
            }
        }
    }

    if let Some(rx) = follow_ups.as_mut() {
        while let Ok(follow_up) = rx.try_recv() {
            let _ = out_tx.send(Outbound::FollowUp(follow_up));
        }
    }
    drop(out_tx);

    match tokio::time::timeout(DRAIN_TIMEOUT, writer).await {
        Ok(joined) => joined??,
        Err(_) => warn!("pending replies did not complete before shutdown"),
    }
    Ok(stats)
}

async fn next_follow_up(rx: &mut Option<mpsc::UnboundedReceiver<FollowUp>>) -> Option<FollowUp> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn handle_line(
    router: &MessageRouter,
    line: &str,
    out_tx: &mpsc::UnboundedSender<Outbound>,
    stats: &mut ServeStats,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    stats.received += 1;

    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            stats.rejected += 1;
            let _ = out_tx.send(Outbound::Reply {
                name: String::new(),
                message_id: None,
                reply: Reply::error(format!("invalid message: {}", e)),
            });
            return;
        }
    };

    let name = envelope.message.name.clone();
    let message_id = envelope.message.message_id.clone();
    let tx = out_tx.clone();
    let respond: Responder = Box::new(move |reply| {
        let _ = tx.send(Outbound::Reply {
            name,
            message_id,
            reply,
        });
    });
    if router.dispatch(envelope.message, envelope.sender, Some(respond)) {
        stats.pending += 1;
    }
}

async fn write_lines<W>(mut output: W, mut rx: mpsc::UnboundedReceiver<Outbound>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        let mut line = serde_json::to_string(&item)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    output.shutdown().await
}
