//! A UPnP AV MediaRenderer: SSDP presence, device/service description and
//! the SOAP control plane, relaying playback to an external player via
//! [`player_ipc`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::constants::SERVER_STRING;
use crate::ssdp::{SsdpRunner, SsdpRunnerOptions};
use crate::state::{DmrState, DmrStateInner, RendererState};
use crate::subscriptions::Subscriptions;
use crate::templates::RootDescriptionInputs;

pub mod constants;
pub mod didl;
mod http_handlers;
mod services;
pub mod soap;
pub mod ssdp;
pub mod state;
pub mod subscriptions;
mod templates;
pub mod timefmt;

#[cfg(test)]
pub(crate) mod test_support;

pub struct DmrServerOptions {
    pub friendly_name: String,
    /// `uuid:<v4>`, stable for the device's lifetime.
    pub udn: String,
    /// `http://<ip>:<port>`, as reachable by controllers on the LAN.
    pub base_url: String,
    pub allow_session_preempt: bool,
    pub link_system_volume: bool,
    pub player_fullscreen: bool,
    pub shutdown: CancellationToken,
}

pub struct DmrServer {
    pub axum_router: axum::Router,
    pub state: DmrState,
    ssdp: SsdpRunner,
}

impl DmrServer {
    /// Build the HTTP router and SSDP runner. Must run inside a tokio
    /// runtime (the SSDP socket registers with the reactor).
    pub fn new(opts: DmrServerOptions) -> Self {
        let root_desc = templates::render_root_description_xml(&RootDescriptionInputs {
            friendly_name: &opts.friendly_name,
            udn: &opts.udn,
            base_url: &opts.base_url,
        });

        let state: DmrState = Arc::new(DmrStateInner {
            udn: opts.udn.clone(),
            allow_session_preempt: opts.allow_session_preempt,
            link_system_volume: opts.link_system_volume,
            rendered_root_description: root_desc.into(),
            renderer: RendererState::new(player_ipc::PlayerOptions {
                fullscreen: opts.player_fullscreen,
            }),
            subscriptions: Subscriptions::default(),
        });

        let axum_router = http_handlers::make_router(state.clone());
        let ssdp = SsdpRunner::new(SsdpRunnerOptions {
            udn: opts.udn,
            description_location: format!("{}/device.xml", opts.base_url),
            server_string: SERVER_STRING.to_owned(),
            notify_interval: Duration::from_secs(30),
            shutdown: opts.shutdown,
        });

        Self {
            axum_router,
            state,
            ssdp,
        }
    }

    /// Announce and answer searches until the shutdown token fires, then
    /// send byebye.
    pub async fn run_ssdp_forever(&self) -> anyhow::Result<()> {
        self.ssdp.run_forever().await
    }
}
