use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use http::header::CONTENT_TYPE;
use tower_http::trace::TraceLayer;

use crate::constants::CONTENT_TYPE_DESCRIPTION_XML;
use crate::state::DmrState;
use crate::{services, subscriptions, templates};

async fn banner() -> impl IntoResponse {
    "RCast DMR running\n"
}

async fn description_xml(State(state): State<DmrState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, CONTENT_TYPE_DESCRIPTION_XML)],
        state.rendered_root_description.clone(),
    )
}

pub fn make_router(state: DmrState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/device.xml", get(description_xml))
        .route(
            "/upnp/service/avtransport.xml",
            get(|| async {
                (
                    [(CONTENT_TYPE, CONTENT_TYPE_DESCRIPTION_XML)],
                    templates::AVTRANSPORT_SCPD_XML,
                )
            }),
        )
        .route(
            "/upnp/service/renderingcontrol.xml",
            get(|| async {
                (
                    [(CONTENT_TYPE, CONTENT_TYPE_DESCRIPTION_XML)],
                    templates::RENDERING_CONTROL_SCPD_XML,
                )
            }),
        )
        .route(
            "/upnp/service/connectionmanager.xml",
            get(|| async {
                (
                    [(CONTENT_TYPE, CONTENT_TYPE_DESCRIPTION_XML)],
                    templates::CONNECTION_MANAGER_SCPD_XML,
                )
            }),
        )
        .route(
            "/upnp/control/avtransport",
            post(services::avtransport::http_handler),
        )
        .route(
            "/upnp/control/renderingcontrol",
            post(services::rendering_control::http_handler),
        )
        .route(
            "/upnp/control/connectionmanager",
            post(services::connection_manager::http_handler),
        )
        .route("/upnp/event/avtransport", any(subscriptions::event_handler))
        .route(
            "/upnp/event/renderingcontrol",
            any(subscriptions::event_handler),
        )
        .route(
            "/upnp/event/connectionmanager",
            any(subscriptions::event_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
