//! Shared fixtures for the control-plane tests: a ready-made axum state
//! and a scripted mpv IPC endpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use player_ipc::PlayerOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use crate::state::{DmrState, DmrStateInner, RendererState};
use crate::subscriptions::Subscriptions;

pub(crate) fn make_state(allow_session_preempt: bool, link_system_volume: bool) -> DmrState {
    Arc::new(DmrStateInner {
        udn: "uuid:12345678-90ab-cdef-1234-567890abcdef".to_owned(),
        allow_session_preempt,
        link_system_volume,
        rendered_root_description: Bytes::from_static(b"<root/>"),
        renderer: RendererState::new(PlayerOptions::default()),
        subscriptions: Subscriptions::default(),
    })
}

/// Binds a mock player socket under `dir` that answers every request with
/// success (`data: 0` for property reads) and forwards each received
/// request line to the returned channel.
pub(crate) fn spawn_mock_player(dir: &Path) -> (PathBuf, UnboundedReceiver<String>) {
    let path = dir.join("mpv.sock");
    let (tx, rx) = unbounded_channel();
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
                let request_id = parsed["request_id"].as_u64().unwrap();
                let is_property_read = parsed["command"][0] == "get_property";
                let _ = tx.send(line);
                let response = if is_property_read {
                    format!("{{\"request_id\":{request_id},\"error\":\"success\",\"data\":0}}\n")
                } else {
                    format!("{{\"request_id\":{request_id},\"error\":\"success\"}}\n")
                };
                if writer.write_all(response.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    });
    (path, rx)
}
