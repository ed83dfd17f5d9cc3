use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Bytes;
use parking_lot::RwLock;
use player_ipc::{IinaPlayer, PlayerOptions};
// tokio's Instant so tests can drive the idle sweep with a paused clock.
use tokio::time::Instant;
use tracing::{debug, info};

use crate::subscriptions::Subscriptions;

/// Player instances idle for this long are reaped on the next registry
/// lookup.
pub const PLAYER_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    PausedPlayback,
    Transitioning,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Stopped => "STOPPED",
            TransportState::Playing => "PLAYING",
            TransportState::PausedPlayback => "PAUSED_PLAYBACK",
            TransportState::Transitioning => "TRANSITIONING",
        }
    }
}

struct PlayerEntry {
    player: Arc<IinaPlayer>,
    #[allow(dead_code)]
    created_at: Instant,
    last_used: Instant,
}

#[derive(Default)]
struct Media {
    uri: String,
    metadata: String,
}

struct Inner {
    media: Media,
    transport_state: TransportState,
    volume: i32,
    mute: bool,
    session_owner: Option<IpAddr>,
    session_since: Option<SystemTime>,
    players: HashMap<IpAddr, PlayerEntry>,
}

/// The renderer's single shared mutable store: media reference, transport
/// state, rendering snapshot, session ownership and the per-controller
/// player registry.
pub struct RendererState {
    player_opts: PlayerOptions,
    inner: RwLock<Inner>,
}

impl RendererState {
    pub fn new(player_opts: PlayerOptions) -> Self {
        Self {
            player_opts,
            inner: RwLock::new(Inner {
                media: Media::default(),
                transport_state: TransportState::Stopped,
                volume: 50,
                mute: false,
                session_owner: None,
                session_since: None,
                players: HashMap::new(),
            }),
        }
    }

    pub fn uri_and_metadata(&self) -> (String, String) {
        let inner = self.inner.read();
        (inner.media.uri.clone(), inner.media.metadata.clone())
    }

    /// Setting a new media reference always drops back to STOPPED.
    pub fn set_uri(&self, uri: &str, metadata: &str) {
        let mut inner = self.inner.write();
        inner.media.uri = uri.to_owned();
        inner.media.metadata = metadata.to_owned();
        inner.transport_state = TransportState::Stopped;
    }

    pub fn transport_state(&self) -> TransportState {
        self.inner.read().transport_state
    }

    pub fn set_transport_state(&self, state: TransportState) {
        self.inner.write().transport_state = state;
    }

    pub fn volume(&self) -> i32 {
        self.inner.read().volume
    }

    pub fn set_volume(&self, volume: i32) {
        self.inner.write().volume = volume;
    }

    pub fn mute(&self) -> bool {
        self.inner.read().mute
    }

    pub fn set_mute(&self, mute: bool) {
        self.inner.write().mute = mute;
    }

    /// The session gate: succeeds when nobody owns the session (caller
    /// becomes owner), when the caller already owns it, or when preemption
    /// is allowed (ownership moves to the caller).
    pub fn acquire_or_check_session(&self, controller: IpAddr, allow_preempt: bool) -> bool {
        let mut inner = self.inner.write();
        match inner.session_owner {
            Some(owner) if owner == controller => true,
            None => {
                info!(controller = %controller, "session acquired");
                inner.session_owner = Some(controller);
                inner.session_since = Some(SystemTime::now());
                true
            }
            Some(owner) if allow_preempt => {
                info!(controller = %controller, previous = %owner, "session preempted");
                inner.session_owner = Some(controller);
                inner.session_since = Some(SystemTime::now());
                true
            }
            Some(_) => false,
        }
    }

    pub fn release_session(&self) {
        let mut inner = self.inner.write();
        inner.session_owner = None;
        inner.session_since = None;
    }

    pub fn session(&self) -> Option<(IpAddr, SystemTime)> {
        let inner = self.inner.read();
        inner.session_owner.zip(inner.session_since)
    }

    /// Look up (or lazily create) the caller's player instance. Expired
    /// entries are swept on every lookup.
    pub fn get_player(&self, controller: IpAddr) -> Arc<IinaPlayer> {
        let mut inner = self.inner.write();
        Self::sweep_locked(&mut inner);

        let now = Instant::now();
        let entry = inner.players.entry(controller).or_insert_with(|| {
            debug!(controller = %controller, "creating player instance");
            PlayerEntry {
                player: Arc::new(IinaPlayer::new(self.player_opts)),
                created_at: now,
                last_used: now,
            }
        });
        entry.last_used = now;
        entry.player.clone()
    }

    /// Remove the caller's player instance without stopping it; the caller
    /// owns the shutdown.
    pub fn take_player(&self, controller: IpAddr) -> Option<Arc<IinaPlayer>> {
        let mut inner = self.inner.write();
        inner.players.remove(&controller).map(|entry| entry.player)
    }

    /// The instance playback queries should talk to: the session owner's
    /// player when a session is live, otherwise any instance.
    pub fn active_player(&self) -> Option<Arc<IinaPlayer>> {
        let inner = self.inner.read();
        if let Some(owner) = inner.session_owner
            && let Some(entry) = inner.players.get(&owner)
        {
            return Some(entry.player.clone());
        }
        inner.players.values().next().map(|entry| entry.player.clone())
    }

    /// Used by tests to install a scripted player for a controller.
    #[cfg(test)]
    pub(crate) fn insert_player(&self, controller: IpAddr, player: Arc<IinaPlayer>) {
        let now = Instant::now();
        self.inner.write().players.insert(
            controller,
            PlayerEntry {
                player,
                created_at: now,
                last_used: now,
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn player_count(&self) -> usize {
        self.inner.read().players.len()
    }

    fn sweep_locked(inner: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<IpAddr> = inner
            .players
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) > PLAYER_IDLE_TIMEOUT)
            .map(|(controller, _)| *controller)
            .collect();
        for controller in expired {
            if let Some(entry) = inner.players.remove(&controller) {
                debug!(controller = %controller, "dropping idle player instance");
                spawn_stop(entry.player);
            }
        }
    }

    /// Stop every player instance; called once at shutdown.
    pub async fn stop_all(&self) {
        let players: Vec<Arc<IinaPlayer>> = {
            let mut inner = self.inner.write();
            inner.players.drain().map(|(_, entry)| entry.player).collect()
        };
        for player in players {
            if let Err(e) = player.stop().await {
                debug!("error stopping player: {e}");
            }
        }
    }
}

fn spawn_stop(player: Arc<IinaPlayer>) {
    tokio::spawn(async move {
        if let Err(e) = player.stop().await {
            debug!("error stopping expired player: {e}");
        }
    });
}

/// Everything the HTTP handlers need, shared behind one Arc (axum state).
pub struct DmrStateInner {
    pub udn: String,
    pub allow_session_preempt: bool,
    pub link_system_volume: bool,
    pub rendered_root_description: Bytes,
    pub renderer: RendererState,
    pub subscriptions: Subscriptions,
}

pub type DmrState = Arc<DmrStateInner>;
