//! Wire types for the mpv JSON IPC protocol: one JSON object per line in
//! both directions.
//!
//! <https://mpv.io/manual/stable/#json-ipc>

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize)]
pub struct IpcRequest {
    pub command: Vec<Value>,
    pub request_id: u64,
    #[serde(rename = "async", skip_serializing_if = "std::ops::Not::not")]
    pub asynchronous: bool,
}

impl IpcRequest {
    pub fn new(request_id: u64, command: Vec<Value>) -> Self {
        Self {
            command,
            request_id,
            asynchronous: false,
        }
    }

    pub fn set_property(request_id: u64, name: &str, value: impl Into<Value>) -> Self {
        Self::new(request_id, vec![json!("set_property"), json!(name), value.into()])
    }

    pub fn get_property(request_id: u64, name: &str) -> Self {
        Self::new(request_id, vec![json!("get_property"), json!(name)])
    }

    pub fn loadfile(request_id: u64, uri: &str) -> Self {
        Self::new(request_id, vec![json!("loadfile"), json!(uri), json!("replace")])
    }

    pub fn seek(request_id: u64, seconds: f64) -> Self {
        Self::new(
            request_id,
            vec![json!("seek"), seconds_value(seconds), json!("absolute")],
        )
    }

    pub fn screenshot(request_id: u64) -> Self {
        Self::new(request_id, vec![json!("screenshot")])
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

// mpv accepts both, but whole seconds are sent as a JSON integer so the
// line matches what interactive clients send.
fn seconds_value(seconds: f64) -> Value {
    if seconds.is_finite() && seconds.fract() == 0.0 {
        json!(seconds as i64)
    } else {
        json!(seconds)
    }
}

/// Any line the player writes back: a response to one of our requests or
/// an asynchronous event.
#[derive(Debug, Clone, Deserialize)]
pub struct IpcMessage {
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl IpcMessage {
    pub fn is_event(&self) -> bool {
        self.event.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.error.as_deref() == Some("success")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_shape() {
        let line = IpcRequest::seek(7, 90.0).to_line().unwrap();
        assert_eq!(
            line,
            "{\"command\":[\"seek\",90,\"absolute\"],\"request_id\":7}\n"
        );

        let line = IpcRequest::seek(8, 12.5).to_line().unwrap();
        assert_eq!(
            line,
            "{\"command\":[\"seek\",12.5,\"absolute\"],\"request_id\":8}\n"
        );

        let line = IpcRequest::set_property(3, "pause", true).to_line().unwrap();
        assert_eq!(
            line,
            "{\"command\":[\"set_property\",\"pause\",true],\"request_id\":3}\n"
        );
    }

    #[test]
    fn test_async_flag_omitted_unless_set() {
        let mut req = IpcRequest::screenshot(1);
        assert!(!req.to_line().unwrap().contains("async"));
        req.asynchronous = true;
        assert!(req.to_line().unwrap().contains("\"async\":true"));
    }

    #[test]
    fn test_parse_response_and_event() {
        let resp: IpcMessage =
            serde_json::from_str(r#"{"request_id":7,"error":"success","data":42}"#).unwrap();
        assert_eq!(resp.request_id, Some(7));
        assert!(resp.is_success());
        assert_eq!(resp.data, Some(json!(42)));

        let event: IpcMessage =
            serde_json::from_str(r#"{"event":"property-change","name":"pause"}"#).unwrap();
        assert!(event.is_event());
        assert_eq!(event.request_id, None);
    }
}
