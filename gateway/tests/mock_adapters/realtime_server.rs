//! Scripted OpenAI Realtime WebSocket server.
//!
//! Answers `session.update` with `session.created` and, once a configured
//! number of caller audio appends has arrived, speaks one assistant item.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::prelude::*;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Byte value of every sample the mock assistant speaks.
pub const ASSISTANT_FILL: u8 = 0x55;

#[derive(Clone, Copy)]
struct Script {
    reply_after_appends: usize,
    chunks: usize,
}

pub struct MockRealtimeServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
}

impl MockRealtimeServer {
    /// Start listening on an ephemeral port.
    pub async fn start(reply_after_appends: usize, chunks: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let script = Script {
            reply_after_appends,
            chunks,
        };

        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, log.clone(), script));
            }
        });

        Self { addr, received }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// `type` of every client event received, in arrival order.
    pub fn received_types(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }
}

async fn serve_connection(stream: TcpStream, received: Arc<Mutex<Vec<Value>>>, script: Script) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let mut appends = 0;

    while let Some(Ok(message)) = read.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(event) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let kind = event["type"].as_str().unwrap_or_default().to_string();
        received.lock().push(event);

        let replies = match kind.as_str() {
            "session.update" => vec![json!({
                "type": "session.created",
                "session": { "id": "sess_mock", "model": "gpt-realtime" }
            })],
            "input_audio_buffer.append" => {
                appends += 1;
                if appends == script.reply_after_appends {
                    assistant_turn(script.chunks)
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        };

        for reply in replies {
            if write
                .send(Message::Text(reply.to_string().into()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

fn assistant_turn(chunks: usize) -> Vec<Value> {
    let delta = BASE64_STANDARD.encode([ASSISTANT_FILL; 160]);
    let mut events = vec![json!({
        "type": "response.created",
        "response": { "id": "resp_1", "status": "in_progress" }
    })];
    for _ in 0..chunks {
        events.push(json!({
            "type": "response.audio.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "delta": delta,
        }));
    }
    events.push(json!({
        "type": "response.audio.done",
        "response_id": "resp_1",
        "item_id": "item_1"
    }));
    events.push(json!({
        "type": "response.done",
        "response": { "id": "resp_1", "status": "completed" }
    }));
    events
}
