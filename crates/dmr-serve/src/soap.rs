//! SOAP envelope plumbing shared by the three control endpoints.

use std::borrow::Cow;

use axum::response::{IntoResponse, Response};
use http::{StatusCode, header::CONTENT_TYPE};

use crate::constants::CONTENT_TYPE_XML_UTF8;

/// A UPnP action fault, rendered as HTTP 500 + the standard UPnPError
/// detail structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpnpError {
    pub code: u16,
    pub description: &'static str,
}

impl UpnpError {
    pub const INVALID_ACTION: UpnpError = UpnpError {
        code: 401,
        description: "Invalid Action",
    };
    pub const ACTION_FAILED: UpnpError = UpnpError {
        code: 501,
        description: "Action Failed",
    };
    pub const INVALID_CONNECTION_REFERENCE: UpnpError = UpnpError {
        code: 706,
        description: "Invalid connection reference",
    };
    pub const SEEK_MODE_NOT_SUPPORTED: UpnpError = UpnpError {
        code: 710,
        description: "Seek mode not supported",
    };
    pub const ILLEGAL_SEEK_TARGET: UpnpError = UpnpError {
        code: 711,
        description: "Illegal seek target",
    };
    pub const SESSION_IN_USE: UpnpError = UpnpError {
        code: 712,
        description: "Session in use",
    };
    pub const NO_CONTENT: UpnpError = UpnpError {
        code: 714,
        description: "No content selected",
    };
}

/// Extract the action name from a SOAPACTION header value: the last
/// `#`-separated segment, surrounding quotes stripped.
pub fn parse_soap_action(header: &str) -> &str {
    let header = header.trim().trim_matches('"');
    match header.rfind('#') {
        Some(i) => &header[i + 1..],
        None => header,
    }
}

pub fn soap_ok(service_urn: &str, response_name: &str) -> Response {
    soap_ok_with_body(service_urn, response_name, "")
}

pub fn soap_ok_with_body(service_urn: &str, response_name: &str, inner: &str) -> Response {
    let envelope = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:{response_name} xmlns:u="{service_urn}">{inner}</u:{response_name}>
  </s:Body>
</s:Envelope>"#
    );
    ([(CONTENT_TYPE, CONTENT_TYPE_XML_UTF8)], envelope).into_response()
}

pub fn soap_fault(err: UpnpError) -> Response {
    let envelope = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>{code}</errorCode>
          <errorDescription>{description}</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#,
        code = err.code,
        description = err.description,
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, CONTENT_TYPE_XML_UTF8)],
        envelope,
    )
        .into_response()
}

/// Tolerant argument extraction: finds `<tag>…</tag>` or `<u:tag>…</u:tag>`
/// by substring search and returns the trimmed, entity-unescaped inner
/// text. Controllers send flat argument elements, so no real XML parse is
/// needed; returns the empty string when the element is absent.
pub fn xml_text(body: &[u8], tag: &str) -> String {
    let body = String::from_utf8_lossy(body);
    let inner = match find_tag(&body, tag, "") {
        Some(inner) => inner,
        None => match find_tag(&body, tag, "u:") {
            Some(inner) => inner,
            None => return String::new(),
        },
    };
    let inner = inner.trim();
    match quick_xml::escape::unescape(inner) {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => inner.to_owned(),
    }
}

fn find_tag<'a>(body: &'a str, tag: &str, prefix: &str) -> Option<&'a str> {
    let open = format!("<{prefix}{tag}>");
    let close = format!("</{prefix}{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)?;
    Some(&body[start..start + end])
}

pub fn xml_escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(
            parse_soap_action("\"urn:schemas-upnp-org:service:AVTransport:1#Play\""),
            "Play"
        );
        assert_eq!(
            parse_soap_action("urn:schemas-upnp-org:service:AVTransport:1#Stop"),
            "Stop"
        );
        assert_eq!(parse_soap_action("\"Pause\""), "Pause");
        assert_eq!(parse_soap_action(""), "");
    }

    #[test]
    fn test_xml_text_plain_and_prefixed() {
        let body = b"<u:SetAVTransportURI><CurrentURI> http://host/vid.mp4 </CurrentURI></u:SetAVTransportURI>";
        assert_eq!(xml_text(body, "CurrentURI"), "http://host/vid.mp4");

        let body = b"<u:Seek><u:Unit>REL_TIME</u:Unit></u:Seek>";
        assert_eq!(xml_text(body, "Unit"), "REL_TIME");

        assert_eq!(xml_text(body, "Target"), "");
    }

    #[test]
    fn test_xml_text_unescapes_entities() {
        let body = b"<CurrentURI>http://host/a.mp4?x=1&amp;y=2</CurrentURI>";
        assert_eq!(xml_text(body, "CurrentURI"), "http://host/a.mp4?x=1&y=2");

        let body =
            b"<CurrentURIMetaData>&lt;DIDL-Lite&gt;&lt;item id=&quot;1&quot;/&gt;&lt;/DIDL-Lite&gt;</CurrentURIMetaData>";
        assert_eq!(
            xml_text(body, "CurrentURIMetaData"),
            "<DIDL-Lite><item id=\"1\"/></DIDL-Lite>"
        );
    }

    #[test]
    fn test_fault_envelope() {
        let err = UpnpError::SESSION_IN_USE;
        assert_eq!(err.code, 712);
        let response = soap_fault(err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
