pub(crate) mod avtransport;
pub(crate) mod connection_manager;
pub(crate) mod rendering_control;

use std::net::IpAddr;

use axum::response::Response;

use crate::soap::{UpnpError, soap_fault};
use crate::state::DmrState;

/// The session gate every mutating action runs before touching playback.
/// Returns the 712 fault to send when the caller may not mutate.
pub(crate) fn session_gate(state: &DmrState, controller: IpAddr) -> Option<Response> {
    if state
        .renderer
        .acquire_or_check_session(controller, state.allow_session_preempt)
    {
        None
    } else {
        Some(soap_fault(UpnpError::SESSION_IN_USE))
    }
}
