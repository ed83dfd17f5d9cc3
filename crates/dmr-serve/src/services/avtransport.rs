//! AVTransport:1 control endpoint.

use std::net::{IpAddr, SocketAddr};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use bstr::BStr;
use http::HeaderMap;
use tracing::{debug, info, trace, warn};

use crate::constants::UPNP_SERVICE_AVTRANSPORT;
use crate::didl;
use crate::services::session_gate;
use crate::soap::{
    UpnpError, parse_soap_action, soap_fault, soap_ok, soap_ok_with_body, xml_escape, xml_text,
};
use crate::state::{DmrState, TransportState};
use crate::timefmt::{duration_to_time, time_to_seconds};

fn ok(response_name: &str) -> Response {
    soap_ok(UPNP_SERVICE_AVTRANSPORT, response_name)
}

fn ok_with_body(response_name: &str, inner: &str) -> Response {
    soap_ok_with_body(UPNP_SERVICE_AVTRANSPORT, response_name, inner)
}

pub(crate) async fn http_handler(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<DmrState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let action = headers
        .get("soapaction")
        .and_then(|value| value.to_str().ok())
        .map(parse_soap_action)
        .unwrap_or_default();
    let controller = addr.ip();
    trace!(action, controller = %controller, body = ?BStr::new(&body), "avtransport control request");

    match action {
        "SetAVTransportURI" => set_av_transport_uri(&state, controller, &body),
        "Play" => play(&state, controller),
        "Pause" => pause(&state, controller),
        "Stop" => stop(&state, controller),
        "Seek" => seek(&state, controller, &body),
        "GetTransportInfo" => get_transport_info(&state),
        "GetPositionInfo" => get_position_info(&state).await,
        "GetMediaInfo" => get_media_info(&state).await,
        "GetTransportSettings" => get_transport_settings(),
        "GetDeviceCapabilities" => get_device_capabilities(),
        other => {
            debug!(action = other, "unsupported AVTransport action");
            soap_fault(UpnpError::INVALID_ACTION)
        }
    }
}

fn set_av_transport_uri(state: &DmrState, controller: IpAddr, body: &[u8]) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let uri = xml_text(body, "CurrentURI");
    let metadata = xml_text(body, "CurrentURIMetaData");
    if !metadata.is_empty() {
        match didl::parse_metadata(&metadata) {
            Ok(didl) => {
                if let Some(title) = didl.title() {
                    info!(title, uri, "media selected");
                }
            }
            Err(e) => debug!("ignoring unparseable CurrentURIMetaData: {e:#}"),
        }
    }
    state.renderer.set_uri(&uri, &metadata);
    ok("SetAVTransportURIResponse")
}

/// The player call runs in the background: the SOAP response is written
/// immediately, and the transport state flips to PLAYING only once the
/// player reports success.
fn play(state: &DmrState, controller: IpAddr) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let (uri, _) = state.renderer.uri_and_metadata();
    if uri.is_empty() {
        return soap_fault(UpnpError::NO_CONTENT);
    }

    let player = state.renderer.get_player(controller);
    let volume = state.renderer.volume();
    let state = state.clone();
    tokio::spawn(async move {
        match player.play(&uri, volume).await {
            Ok(()) => state.renderer.set_transport_state(TransportState::Playing),
            Err(e) => warn!(uri, "player play failed: {e}"),
        }
    });
    ok("PlayResponse")
}

fn pause(state: &DmrState, controller: IpAddr) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let player = state.renderer.get_player(controller);
    let state = state.clone();
    tokio::spawn(async move {
        match player.pause().await {
            Ok(()) => state
                .renderer
                .set_transport_state(TransportState::PausedPlayback),
            Err(e) => warn!("player pause failed: {e}"),
        }
    });
    ok("PauseResponse")
}

/// Stop tears the caller's player instance down and releases the session
/// even when the kill reports an error; a wedged player must not keep the
/// renderer occupied.
fn stop(state: &DmrState, controller: IpAddr) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let player = state.renderer.get_player(controller);
    let state = state.clone();
    tokio::spawn(async move {
        state.renderer.take_player(controller);
        if let Err(e) = player.stop().await {
            warn!("player stop failed: {e}");
        }
        state.renderer.set_transport_state(TransportState::Stopped);
        state.renderer.release_session();
    });
    ok("StopResponse")
}

fn seek(state: &DmrState, controller: IpAddr, body: &[u8]) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let unit = xml_text(body, "Unit");
    if unit != "REL_TIME" && unit != "ABS_TIME" {
        return soap_fault(UpnpError::SEEK_MODE_NOT_SUPPORTED);
    }
    let target = xml_text(body, "Target");
    let Some(seconds) = time_to_seconds(&target) else {
        return soap_fault(UpnpError::ILLEGAL_SEEK_TARGET);
    };

    let player = state.renderer.get_player(controller);
    tokio::spawn(async move {
        if let Err(e) = player.seek(seconds).await {
            warn!(seconds, "player seek failed: {e}");
        }
    });
    ok("SeekResponse")
}

fn get_transport_info(state: &DmrState) -> Response {
    let inner = format!(
        "<CurrentTransportState>{}</CurrentTransportState>\
         <CurrentTransportStatus>OK</CurrentTransportStatus>\
         <CurrentSpeed>1</CurrentSpeed>",
        state.renderer.transport_state().as_str()
    );
    ok_with_body("GetTransportInfoResponse", &inner)
}

async fn get_position_info(state: &DmrState) -> Response {
    let (uri, _) = state.renderer.uri_and_metadata();
    let (duration, position) = query_player_times(state).await;
    let inner = format!(
        "<Track>0</Track>\
         <TrackDuration>{duration}</TrackDuration>\
         <TrackMetaData></TrackMetaData>\
         <TrackURI>{uri}</TrackURI>\
         <RelTime>{position}</RelTime>\
         <AbsTime>{position}</AbsTime>\
         <RelCount>0</RelCount>\
         <AbsCount>0</AbsCount>",
        duration = duration_to_time(duration),
        position = duration_to_time(position),
        uri = xml_escape(&uri),
    );
    ok_with_body("GetPositionInfoResponse", &inner)
}

async fn get_media_info(state: &DmrState) -> Response {
    let (uri, metadata) = state.renderer.uri_and_metadata();
    let duration = match state.renderer.active_player() {
        Some(player) => player.get_duration().await.unwrap_or_else(|e| {
            debug!("media duration query failed: {e}");
            0.0
        }),
        None => 0.0,
    };
    let inner = format!(
        "<NrTracks>1</NrTracks>\
         <MediaDuration>{duration}</MediaDuration>\
         <CurrentURI>{uri}</CurrentURI>\
         <CurrentURIMetaData>{metadata}</CurrentURIMetaData>\
         <NextURI></NextURI>\
         <NextURIMetaData></NextURIMetaData>\
         <PlayMedium>NETWORK</PlayMedium>\
         <RecordMedium>NOT_IMPLEMENTED</RecordMedium>\
         <WriteStatus>NOT_IMPLEMENTED</WriteStatus>",
        duration = duration_to_time(duration),
        uri = xml_escape(&uri),
        metadata = xml_escape(&metadata),
    );
    ok_with_body("GetMediaInfoResponse", &inner)
}

/// Queries the active player best-effort; either value falls back to zero
/// (rendered as 00:00:00) when the player can't answer.
async fn query_player_times(state: &DmrState) -> (f64, f64) {
    let Some(player) = state.renderer.active_player() else {
        return (0.0, 0.0);
    };
    let duration = player.get_duration().await.unwrap_or_else(|e| {
        debug!("duration query failed: {e}");
        0.0
    });
    let position = player.get_position().await.unwrap_or_else(|e| {
        debug!("position query failed: {e}");
        0.0
    });
    (duration, position)
}

fn get_transport_settings() -> Response {
    ok_with_body(
        "GetTransportSettingsResponse",
        "<PlayMode>NORMAL</PlayMode><RecQualityMode>NOT_IMPLEMENTED</RecQualityMode>",
    )
}

fn get_device_capabilities() -> Response {
    ok_with_body(
        "GetDeviceCapabilitiesResponse",
        "<PlayMedia>NETWORK</PlayMedia>\
         <RecMedia>NOT_IMPLEMENTED</RecMedia>\
         <RecQualityModes>NOT_IMPLEMENTED</RecQualityModes>",
    )
}
