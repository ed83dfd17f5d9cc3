//! Supervision of one external IINA process and the request/response
//! channel to it over its mpv IPC unix socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::PlayerIpcError;
use crate::ipc::{IpcMessage, IpcRequest};

const SOCK_PATH_PREFIX: &str = "/tmp/rcast_ipc_";

/// Launcher candidates, preferred first. iina-cli forwards --mpv-* flags
/// to the embedded mpv, which the .app bundle entry point does not.
const PLAYER_CANDIDATES: &[&str] = &[
    "/opt/homebrew/bin/iina-cli",
    "/usr/local/bin/iina-cli",
    "/Applications/IINA.app/Contents/MacOS/iina-cli",
];

const FULLSCREEN_RETRY_DELAY: Duration = Duration::from_secs(2);
const FULLSCREEN_RETRY_INTERVAL: Duration = Duration::from_millis(500);
const FULLSCREEN_RETRY_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerOptions {
    /// Start playback fullscreen and keep re-asserting it while the
    /// player is still warming up.
    pub fullscreen: bool,
}

struct IpcConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[derive(Default)]
struct Inner {
    conn: Option<IpcConn>,
    sock_path: Option<PathBuf>,
    request_id: u64,
    process: Option<Child>,
}

/// One logical player: a child process handle plus a lazily-dialed IPC
/// connection. All mutable state lives under one async mutex, so commands
/// on a single instance are serialized end to end.
pub struct IinaPlayer {
    opts: PlayerOptions,
    inner: tokio::sync::Mutex<Inner>,
}

impl IinaPlayer {
    pub fn new(opts: PlayerOptions) -> Self {
        Self {
            opts,
            inner: tokio::sync::Mutex::new(Inner::default()),
        }
    }

    /// Speak to an already-running player listening on `path` instead of
    /// spawning our own (mpv started with --input-ipc-server, or a test
    /// double).
    pub fn attach(path: impl Into<PathBuf>, opts: PlayerOptions) -> Self {
        Self {
            opts,
            inner: tokio::sync::Mutex::new(Inner {
                sock_path: Some(path.into()),
                ..Default::default()
            }),
        }
    }

    /// Start playing `uri`. Reuses the running process when possible,
    /// otherwise kills whatever was there and spawns fresh.
    pub async fn play(self: &Arc<Self>, uri: &str, volume: i32) -> Result<(), PlayerIpcError> {
        let mut inner = self.inner.lock().await;

        if inner.process.is_some() {
            match self.try_reuse(&mut inner, uri, volume).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("player reuse failed, respawning: {e}");
                    if let Err(e) = Self::stop_locked(&mut inner).await {
                        debug!("error stopping stale player: {e}");
                    }
                }
            }
        }

        self.spawn_locked(&mut inner, uri, volume)?;
        if self.opts.fullscreen {
            self.spawn_fullscreen_enforcement();
        }
        Ok(())
    }

    async fn try_reuse(
        &self,
        inner: &mut Inner,
        uri: &str,
        volume: i32,
    ) -> Result<(), PlayerIpcError> {
        let current = self
            .dispatch(inner, |id| IpcRequest::get_property(id, "path"))
            .await?;
        if current.as_ref().and_then(Value::as_str) == Some(uri) {
            self.dispatch(inner, |id| IpcRequest::set_property(id, "pause", false))
                .await?;
        } else {
            self.dispatch(inner, |id| IpcRequest::loadfile(id, uri)).await?;
            if self.opts.fullscreen {
                self.dispatch(inner, |id| IpcRequest::set_property(id, "fullscreen", true))
                    .await?;
            }
        }
        self.dispatch(inner, |id| IpcRequest::set_property(id, "volume", volume))
            .await?;
        Ok(())
    }

    fn spawn_locked(
        &self,
        inner: &mut Inner,
        uri: &str,
        volume: i32,
    ) -> Result<(), PlayerIpcError> {
        let binary = find_player_binary().ok_or(PlayerIpcError::BinaryNotFound)?;
        let sock_path = PathBuf::from(format!("{}{}", SOCK_PATH_PREFIX, uuid::Uuid::new_v4()));

        let mut cmd = Command::new(binary);
        cmd.arg("--keep-running")
            .arg(format!("--mpv-input-ipc-server={}", sock_path.display()))
            .arg(format!("--mpv-volume={volume}"))
            .arg("--mpv-keep-open=yes");
        if self.opts.fullscreen {
            cmd.arg("--mpv-fs");
        }
        cmd.arg(uri);

        debug!(binary, sock_path = %sock_path.display(), uri, "spawning player");
        let child = cmd.spawn().map_err(PlayerIpcError::Spawn)?;

        inner.conn = None;
        inner.sock_path = Some(sock_path);
        inner.process = Some(child);
        Ok(())
    }

    // IINA ignores fullscreen flags until its window exists, so keep
    // poking the property for a few seconds after spawn.
    fn spawn_fullscreen_enforcement(self: &Arc<Self>) {
        let player = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(FULLSCREEN_RETRY_DELAY).await;
            for attempt in 1..=FULLSCREEN_RETRY_ATTEMPTS {
                match player.set_fullscreen(true).await {
                    Ok(()) => {
                        debug!(attempt, "fullscreen enforced");
                        return;
                    }
                    Err(e) => trace!(attempt, "fullscreen attempt failed: {e}"),
                }
                tokio::time::sleep(FULLSCREEN_RETRY_INTERVAL).await;
            }
            warn!(
                attempts = FULLSCREEN_RETRY_ATTEMPTS,
                "giving up on enforcing fullscreen"
            );
        });
    }

    pub async fn pause(&self) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "pause", true))
            .await
            .map(drop)
    }

    pub async fn resume(&self) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "pause", false))
            .await
            .map(drop)
    }

    pub async fn set_volume(&self, volume: i32) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "volume", volume))
            .await
            .map(drop)
    }

    pub async fn set_mute(&self, mute: bool) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "mute", mute))
            .await
            .map(drop)
    }

    pub async fn set_fullscreen(&self, fullscreen: bool) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "fullscreen", fullscreen))
            .await
            .map(drop)
    }

    pub async fn set_speed(&self, speed: f64) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "speed", speed))
            .await
            .map(drop)
    }

    pub async fn set_title(&self, title: &str) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::set_property(id, "title", title))
            .await
            .map(drop)
    }

    pub async fn screenshot(&self) -> Result<(), PlayerIpcError> {
        self.command(IpcRequest::screenshot).await.map(drop)
    }

    /// Seek to an absolute position in seconds.
    pub async fn seek(&self, seconds: f64) -> Result<(), PlayerIpcError> {
        self.command(|id| IpcRequest::seek(id, seconds)).await.map(drop)
    }

    pub async fn get_position(&self) -> Result<f64, PlayerIpcError> {
        self.get_float_property("time-pos").await
    }

    pub async fn get_duration(&self) -> Result<f64, PlayerIpcError> {
        self.get_float_property("duration").await
    }

    async fn get_float_property(&self, property: &'static str) -> Result<f64, PlayerIpcError> {
        let data = self
            .command(|id| IpcRequest::get_property(id, property))
            .await?;
        data.as_ref()
            .and_then(Value::as_f64)
            .ok_or(PlayerIpcError::PropertyType { property })
    }

    async fn command(
        &self,
        make_request: impl Fn(u64) -> IpcRequest,
    ) -> Result<Option<Value>, PlayerIpcError> {
        let mut inner = self.inner.lock().await;
        self.dispatch(&mut inner, make_request).await
    }

    /// Send one request and wait for its response line. Any connection
    /// error tears the connection down and the whole exchange is retried
    /// once; a second failure surfaces to the caller.
    async fn dispatch(
        &self,
        inner: &mut Inner,
        make_request: impl Fn(u64) -> IpcRequest,
    ) -> Result<Option<Value>, PlayerIpcError> {
        let sock_path = inner
            .sock_path
            .clone()
            .ok_or(PlayerIpcError::NoSocketPath)?;

        inner.request_id += 1;
        let request_id = inner.request_id;
        let line = make_request(request_id).to_line()?;

        let mut last_err = PlayerIpcError::NoSocketPath;
        for attempt in 0..2 {
            if inner.conn.is_none() {
                match UnixStream::connect(&sock_path).await {
                    Ok(stream) => {
                        let (reader, writer) = stream.into_split();
                        inner.conn = Some(IpcConn {
                            reader: BufReader::new(reader),
                            writer,
                        });
                    }
                    Err(source) => {
                        last_err = PlayerIpcError::Connect {
                            path: sock_path.clone(),
                            source,
                        };
                        continue;
                    }
                }
            }
            let Some(conn) = inner.conn.as_mut() else {
                continue;
            };

            match roundtrip(conn, &line, request_id).await {
                Ok(msg) if msg.is_success() => return Ok(msg.data),
                Ok(msg) => {
                    return Err(PlayerIpcError::Server(
                        msg.error.unwrap_or_else(|| "missing error field".to_owned()),
                    ));
                }
                Err(e) => {
                    trace!(attempt, "ipc roundtrip failed: {e}");
                    last_err = PlayerIpcError::Io(e);
                    inner.conn = None;
                }
            }
        }
        Err(last_err)
    }

    /// Tear down the IPC connection and socket file, then kill the child.
    /// Safe to call repeatedly; errors are aggregated rather than
    /// short-circuiting the remaining cleanup.
    pub async fn stop(&self) -> Result<(), PlayerIpcError> {
        let mut inner = self.inner.lock().await;
        Self::stop_locked(&mut inner).await
    }

    async fn stop_locked(inner: &mut Inner) -> Result<(), PlayerIpcError> {
        let mut errors = Vec::new();

        inner.conn = None;
        if let Some(path) = inner.sock_path.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => errors.push(format!("removing socket file {path:?}: {e}")),
            }
        }
        if let Some(mut child) = inner.process.take() {
            if let Err(e) = child.kill().await {
                errors.push(format!("killing process: {e}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlayerIpcError::Stop(errors.join("; ")))
        }
    }
}

/// Read lines until the one answering `request_id`. Events and responses
/// to other (stale) requests are skipped, as are lines that fail to parse.
async fn roundtrip(
    conn: &mut IpcConn,
    line: &str,
    request_id: u64,
) -> std::io::Result<IpcMessage> {
    conn.writer.write_all(line.as_bytes()).await?;

    let mut buf = String::new();
    loop {
        buf.clear();
        if conn.reader.read_line(&mut buf).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "ipc socket closed",
            ));
        }
        let msg: IpcMessage = match serde_json::from_str(buf.trim_end()) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(line = buf.trim_end(), "skipping unparseable ipc line: {e}");
                continue;
            }
        };
        if msg.is_event() {
            trace!(event = msg.event.as_deref(), "ignoring ipc event");
            continue;
        }
        match msg.request_id {
            Some(id) if id == request_id => return Ok(msg),
            other => {
                trace!(request_id = ?other, "ignoring stale ipc response");
                continue;
            }
        }
    }
}

fn find_player_binary() -> Option<&'static str> {
    PLAYER_CANDIDATES
        .iter()
        .copied()
        .find(|path| std::fs::metadata(path).is_ok())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;
    use tokio::sync::mpsc::UnboundedSender;

    use super::{IinaPlayer, PlayerOptions};
    use crate::PlayerIpcError;

    /// A scripted player: answers every request with the lines produced
    /// by `respond`, and forwards every received request line to `seen`.
    fn spawn_mock_player(
        path: &Path,
        seen: UnboundedSender<String>,
        respond: impl Fn(u64) -> Vec<String> + Send + 'static,
    ) {
        let listener = UnixListener::bind(path).unwrap();
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
                    let _ = seen.send(line);
                    for out in respond(request_id) {
                        writer.write_all(out.as_bytes()).await.unwrap();
                        writer.write_all(b"\n").await.unwrap();
                    }
                }
            }
        });
    }

    fn success(request_id: u64) -> Vec<String> {
        vec![format!("{{\"request_id\":{request_id},\"error\":\"success\"}}")]
    }

    #[tokio::test]
    async fn test_response_demultiplexing() {
        let _ = tracing_subscriber::fmt::try_init();
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("mpv.sock");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        // An event line and a stale response arrive before the real one.
        spawn_mock_player(&sock, tx, |id| {
            vec![
                r#"{"event":"property-change","name":"pause"}"#.to_owned(),
                format!("{{\"request_id\":{},\"error\":\"success\"}}", id.wrapping_sub(1)),
                format!("{{\"request_id\":{id},\"error\":\"success\",\"data\":42}}"),
            ]
        });

        let player = IinaPlayer::attach(&sock, PlayerOptions::default());
        let duration = player.get_duration().await.unwrap();
        assert_eq!(duration, 42.0);
    }

    #[tokio::test]
    async fn test_seek_payload() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("mpv.sock");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_mock_player(&sock, tx, success);

        let player = IinaPlayer::attach(&sock, PlayerOptions::default());
        player.seek(90.0).await.unwrap();

        let line = rx.recv().await.unwrap();
        assert_eq!(line, r#"{"command":["seek",90,"absolute"],"request_id":1}"#);
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("mpv.sock");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_mock_player(&sock, tx, |id| {
            vec![format!(
                "{{\"request_id\":{id},\"error\":\"property unavailable\"}}"
            )]
        });

        let player = IinaPlayer::attach(&sock, PlayerOptions::default());
        match player.get_position().await {
            Err(PlayerIpcError::Server(msg)) => assert_eq!(msg, "property unavailable"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reconnects_once_after_dead_connection() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("mpv.sock");
        let listener = UnixListener::bind(&sock).unwrap();
        tokio::spawn(async move {
            // First connection is dropped without answering; the retry
            // gets a working one.
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
                let id = parsed["request_id"].as_u64().unwrap();
                let out = format!("{{\"request_id\":{id},\"error\":\"success\"}}\n");
                writer.write_all(out.as_bytes()).await.unwrap();
            }
        });

        let player = IinaPlayer::attach(&sock, PlayerOptions::default());
        player.pause().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_removes_socket_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("mpv.sock");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_mock_player(&sock, tx, success);

        let player = Arc::new(IinaPlayer::attach(&sock, PlayerOptions::default()));
        player.pause().await.unwrap();

        player.stop().await.unwrap();
        assert!(!sock.exists());
        // Second stop has nothing left to clean up.
        player.stop().await.unwrap();
    }
}
