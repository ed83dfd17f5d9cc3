//! GENA subscription endpoints. Subscriptions are accepted and renewed so
//! controllers get a SID, but no property-change NOTIFY is ever delivered.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use parking_lot::RwLock;
use tracing::debug;

use crate::state::DmrState;

const SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(1800);

pub struct Subscription {
    #[allow(dead_code)]
    pub callback: String,
}

#[derive(Default)]
pub struct Subscriptions {
    subs: RwLock<HashMap<String, Subscription>>,
}

impl Subscriptions {
    pub fn add(&self, callback: String) -> String {
        let sid = format!("uuid:{}", uuid::Uuid::new_v4());
        self.subs
            .write()
            .insert(sid.clone(), Subscription { callback });
        sid
    }

    pub fn remove(&self, sid: &str) -> bool {
        self.subs.write().remove(sid).is_some()
    }

    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.read().is_empty()
    }
}

fn subscribed_response(sid: &str) -> Response {
    (
        StatusCode::OK,
        [
            ("SID", sid.to_owned()),
            (
                "TIMEOUT",
                format!("Second-{}", SUBSCRIPTION_TIMEOUT.as_secs()),
            ),
        ],
    )
        .into_response()
}

/// Shared handler for the three `/upnp/event/...` endpoints.
pub async fn event_handler(State(state): State<DmrState>, request: Request) -> Response {
    let headers = request.headers();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };

    match request.method().as_str() {
        "SUBSCRIBE" => {
            // A SID means renewal; the same SID is echoed back.
            if let Some(sid) = header("SID") {
                debug!(sid, "subscription renewed");
                return subscribed_response(&sid);
            }
            match (header("CALLBACK"), header("NT")) {
                (Some(callback), Some(nt)) if nt == "upnp:event" => {
                    let sid = state.subscriptions.add(callback);
                    debug!(sid, "subscription accepted");
                    subscribed_response(&sid)
                }
                _ => StatusCode::BAD_REQUEST.into_response(),
            }
        }
        "UNSUBSCRIBE" => match header("SID") {
            Some(sid) => {
                state.subscriptions.remove(&sid);
                StatusCode::OK.into_response()
            }
            None => StatusCode::PRECONDITION_FAILED.into_response(),
        },
        _ => StatusCode::OK.into_response(),
    }
}
