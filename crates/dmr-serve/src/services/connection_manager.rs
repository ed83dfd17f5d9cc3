//! ConnectionManager:1 control endpoint. We are a pure sink with one
//! static connection, so everything here is canned.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use bstr::BStr;
use http::HeaderMap;
use tracing::{debug, trace};

use crate::constants::UPNP_SERVICE_CONNECTION_MANAGER;
use crate::soap::{UpnpError, parse_soap_action, soap_fault, soap_ok_with_body, xml_text};
use crate::state::DmrState;

const DLNA_PARAMS: &str = "DLNA.ORG_OP=01;DLNA.ORG_FLAGS=01700000000000000000000000000000";

const SINK_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/mpeg",
    "video/x-matroska",
    "video/avi",
    "video/x-ms-wmv",
    "video/quicktime",
    "application/vnd.apple.mpegurl",
    "application/x-mpegURL",
    "audio/mpeg",
    "audio/mp4",
    "audio/x-flac",
    "audio/wav",
];

/// The wildcard entry first, then per-MIME entries carrying the DLNA
/// operation/flags parameters some TVs insist on.
fn sink_protocol_info() -> String {
    std::iter::once("http-get:*:*:*".to_owned())
        .chain(
            SINK_MIME_TYPES
                .iter()
                .map(|mime| format!("http-get:*:{mime}:{DLNA_PARAMS}")),
        )
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) async fn http_handler(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(_state): State<DmrState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let action = headers
        .get("soapaction")
        .and_then(|value| value.to_str().ok())
        .map(parse_soap_action)
        .unwrap_or_default();
    trace!(action, controller = %addr.ip(), body = ?BStr::new(&body), "connectionmanager control request");

    match action {
        "GetProtocolInfo" => soap_ok_with_body(
            UPNP_SERVICE_CONNECTION_MANAGER,
            "GetProtocolInfoResponse",
            &format!(
                "<Source></Source><Sink>{}</Sink>",
                sink_protocol_info()
            ),
        ),
        "GetCurrentConnectionIDs" => soap_ok_with_body(
            UPNP_SERVICE_CONNECTION_MANAGER,
            "GetCurrentConnectionIDsResponse",
            "<ConnectionIDs>0</ConnectionIDs>",
        ),
        "GetCurrentConnectionInfo" => {
            let connection_id = xml_text(&body, "ConnectionID");
            if connection_id != "0" {
                return soap_fault(UpnpError::INVALID_CONNECTION_REFERENCE);
            }
            soap_ok_with_body(
                UPNP_SERVICE_CONNECTION_MANAGER,
                "GetCurrentConnectionInfoResponse",
                "<RcsID>0</RcsID>\
                 <AVTransportID>0</AVTransportID>\
                 <ProtocolInfo>http-get:*:video/mp4:*</ProtocolInfo>\
                 <PeerConnectionManager></PeerConnectionManager>\
                 <PeerConnectionID>-1</PeerConnectionID>\
                 <Direction>Input</Direction>\
                 <Status>OK</Status>",
            )
        }
        other => {
            debug!(action = other, "unsupported ConnectionManager action");
            soap_fault(UpnpError::INVALID_ACTION)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Bytes;
    use axum::extract::{ConnectInfo, State};
    use http::{HeaderMap, StatusCode};

    use super::http_handler;
    use crate::constants::UPNP_SERVICE_CONNECTION_MANAGER;
    use crate::state::DmrState;
    use crate::test_support::make_state;

    async fn call(state: &DmrState, action: &str, body: &str) -> (StatusCode, String) {
        let addr = SocketAddr::from(([192, 168, 1, 10], 50000));
        let mut headers = HeaderMap::new();
        headers.insert(
            "SOAPACTION",
            format!("\"{UPNP_SERVICE_CONNECTION_MANAGER}#{action}\"")
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

    #[tokio::test]
    async fn test_protocol_info_is_sink_only() {
        let state = make_state(true, false);
        let (status, body) = call(&state, "GetProtocolInfo", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<Source></Source>"));
        assert!(body.contains("http-get:*:*:*"));
        assert!(body.contains("http-get:*:video/mp4:DLNA.ORG_OP=01;"));
    }

    #[tokio::test]
    async fn test_connection_info_only_knows_connection_zero() {
        let state = make_state(true, false);

        let (status, body) = call(
            &state,
            "GetCurrentConnectionInfo",
            "<u:GetCurrentConnectionInfo><ConnectionID>0</ConnectionID></u:GetCurrentConnectionInfo>",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<Direction>Input</Direction>"));
        assert!(body.contains("<PeerConnectionID>-1</PeerConnectionID>"));

        let (status, body) = call(
            &state,
            "GetCurrentConnectionInfo",
            "<u:GetCurrentConnectionInfo><ConnectionID>5</ConnectionID></u:GetCurrentConnectionInfo>",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("<errorCode>706</errorCode>"));
    }

    #[tokio::test]
    async fn test_connection_ids() {
        let state = make_state(true, false);
        let (status, body) = call(&state, "GetCurrentConnectionIDs", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<ConnectionIDs>0</ConnectionIDs>"));
    }
}
