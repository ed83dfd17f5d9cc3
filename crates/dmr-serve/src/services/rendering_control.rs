//! RenderingControl:1 control endpoint. Unlike AVTransport, the player
//! calls here are synchronous, so a failing player surfaces as a 501
//! fault to the controller.

use std::net::{IpAddr, SocketAddr};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use bstr::BStr;
use http::HeaderMap;
use tracing::{debug, trace, warn};

use crate::constants::UPNP_SERVICE_RENDERING_CONTROL;
use crate::services::session_gate;
use crate::soap::{UpnpError, parse_soap_action, soap_fault, soap_ok, soap_ok_with_body, xml_text};
use crate::state::DmrState;

fn ok(response_name: &str) -> Response {
    soap_ok(UPNP_SERVICE_RENDERING_CONTROL, response_name)
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
    trace!(action, controller = %controller, body = ?BStr::new(&body), "renderingcontrol control request");

    match action {
        "SetVolume" => set_volume(&state, controller, &body).await,
        "GetVolume" => get_volume(&state),
        "SetMute" => set_mute(&state, controller, &body).await,
        "GetMute" => get_mute(&state),
        other => {
            debug!(action = other, "unsupported RenderingControl action");
            soap_fault(UpnpError::INVALID_ACTION)
        }
    }
}

async fn set_volume(state: &DmrState, controller: IpAddr, body: &[u8]) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let desired: i32 = xml_text(body, "DesiredVolume").parse().unwrap_or(0);
    let volume = desired.clamp(0, 100);

    let player = state.renderer.get_player(controller);
    if let Err(e) = player.set_volume(volume).await {
        warn!(volume, "player set volume failed: {e}");
        return soap_fault(UpnpError::ACTION_FAILED);
    }
    if state.link_system_volume
        && let Err(e) = player_ipc::set_system_volume(volume).await
    {
        debug!("system volume call failed: {e}");
    }
    state.renderer.set_volume(volume);
    ok("SetVolumeResponse")
}

fn get_volume(state: &DmrState) -> Response {
    soap_ok_with_body(
        UPNP_SERVICE_RENDERING_CONTROL,
        "GetVolumeResponse",
        &format!("<CurrentVolume>{}</CurrentVolume>", state.renderer.volume()),
    )
}

async fn set_mute(state: &DmrState, controller: IpAddr, body: &[u8]) -> Response {
    if let Some(fault) = session_gate(state, controller) {
        return fault;
    }
    let desired = xml_text(body, "DesiredMute").to_lowercase();
    let mute = desired == "1" || desired == "true";

    let player = state.renderer.get_player(controller);
    if let Err(e) = player.set_mute(mute).await {
        warn!(mute, "player set mute failed: {e}");
        return soap_fault(UpnpError::ACTION_FAILED);
    }
    if state.link_system_volume
        && let Err(e) = player_ipc::set_system_mute(mute).await
    {
        debug!("system mute call failed: {e}");
    }
    state.renderer.set_mute(mute);
    ok("SetMuteResponse")
}

fn get_mute(state: &DmrState) -> Response {
    soap_ok_with_body(
        UPNP_SERVICE_RENDERING_CONTROL,
        "GetMuteResponse",
        &format!(
            "<CurrentMute>{}</CurrentMute>",
            if state.renderer.mute() { "1" } else { "0" }
        ),
    )
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::extract::{ConnectInfo, State};
    use http::{HeaderMap, StatusCode};
    use player_ipc::{IinaPlayer, PlayerOptions};

    use super::http_handler;
    use crate::constants::UPNP_SERVICE_RENDERING_CONTROL;
    use crate::state::DmrState;
    use crate::test_support::{make_state, spawn_mock_player};

    const A: [u8; 4] = [192, 168, 1, 10];

    async fn call(state: &DmrState, action: &str, body: &str) -> (StatusCode, String) {
        let addr = SocketAddr::from((A, 50000));
        let mut headers = HeaderMap::new();
        headers.insert(
            "SOAPACTION",
            format!("\"{UPNP_SERVICE_RENDERING_CONTROL}#{action}\"")
                .parse()
                .unwrap(),
        );
        let response = http_handler(
            ConnectInfo(addr),
            State(state.clone()),
            headers,
            Bytes::from(body.to_owned()),
        )
        .await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn install_mock_player(state: &DmrState, dir: &std::path::Path) {
        let (sock, _requests) = spawn_mock_player(dir);
        state.renderer.insert_player(
            A.into(),
            Arc::new(IinaPlayer::attach(&sock, PlayerOptions::default())),
        );
    }

    #[tokio::test]
    async fn test_set_volume_clamps_and_get_volume_echoes() {
        let state = make_state(true, false);
        let dir = tempfile::tempdir().unwrap();
        install_mock_player(&state, dir.path());

        let (status, body) = call(
            &state,
            "SetVolume",
            "<u:SetVolume><DesiredVolume>150</DesiredVolume></u:SetVolume>",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<u:SetVolumeResponse"));

        let (status, body) = call(&state, "GetVolume", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<CurrentVolume>100</CurrentVolume>"));
    }

    #[tokio::test]
    async fn test_set_volume_without_player_is_501() {
        // No player socket to talk to: the synchronous call fails.
        let state = make_state(true, false);
        let (status, body) = call(
            &state,
            "SetVolume",
            "<u:SetVolume><DesiredVolume>30</DesiredVolume></u:SetVolume>",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("<errorCode>501</errorCode>"));
        // The stored snapshot keeps its previous value.
        let (_, body) = call(&state, "GetVolume", "").await;
        assert!(body.contains("<CurrentVolume>50</CurrentVolume>"));
    }

    #[tokio::test]
    async fn test_set_mute_truthiness() {
        let state = make_state(true, false);
        let dir = tempfile::tempdir().unwrap();
        install_mock_player(&state, dir.path());

        for (value, expected) in [("1", "1"), ("TRUE", "1"), ("0", "0"), ("yes", "0")] {
            let (status, _) = call(
                &state,
                "SetMute",
                &format!("<u:SetMute><DesiredMute>{value}</DesiredMute></u:SetMute>"),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            let (_, body) = call(&state, "GetMute", "").await;
            assert!(
                body.contains(&format!("<CurrentMute>{expected}</CurrentMute>")),
                "{value}: {body}"
            );
        }
    }
}
