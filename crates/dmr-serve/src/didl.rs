//! DIDL-Lite metadata as controllers send it in `CurrentURIMetaData`,
//! e.g.:
//!
//! ```xml
//! <DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
//!     xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"
//!     xmlns:dc="http://purl.org/dc/elements/1.1/">
//!   <item id="0" parentID="video/*" restricted="1">
//!     <dc:title>Some title</dc:title>
//!     <upnp:class>object.item.videoItem</upnp:class>
//!     <res protocolInfo="http-get:*:video/*:*">http://1.2.3.4:123/video</res>
//!   </item>
//! </DIDL-Lite>
//! ```

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DidlLite {
    #[serde(rename = "item", default)]
    pub items: Vec<DidlItem>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DidlItem {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@parentID", default)]
    pub parent_id: String,
    #[serde(rename = "dc:title", default)]
    pub title: String,
    #[serde(rename = "upnp:class", default)]
    pub class: String,
    #[serde(rename = "res", default)]
    pub resources: Vec<DidlResource>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DidlResource {
    #[serde(rename = "@protocolInfo", default)]
    pub protocol_info: String,
    #[serde(rename = "$text", default)]
    pub url: String,
}

/// Parse already-unescaped DIDL-Lite metadata.
pub fn parse_metadata(metadata: &str) -> anyhow::Result<DidlLite> {
    quick_xml::de::from_str(metadata).context("error parsing DIDL-Lite metadata")
}

impl DidlLite {
    /// Title of the first item, if any: the thing worth logging when a
    /// controller casts.
    pub fn title(&self) -> Option<&str> {
        self.items
            .first()
            .map(|item| item.title.as_str())
            .filter(|title| !title.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::parse_metadata;

    #[test]
    fn test_parse_metadata() {
        let didl = parse_metadata(
            r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
    xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/"
    xmlns:dc="http://purl.org/dc/elements/1.1/">
    <item id="byteCast_2c806b" parentID="video/*" restricted="1">
        <dc:title>Big dive</dc:title>
        <upnp:class>object.item.videoItem</upnp:class>
        <res protocolInfo="http-get:*:video/*:DLNA.ORG_OP=01">http://1.2.3.4:123/video</res>
    </item>
</DIDL-Lite>"#,
        )
        .unwrap();

        assert_eq!(didl.title(), Some("Big dive"));
        let item = &didl.items[0];
        assert_eq!(item.id, "byteCast_2c806b");
        assert_eq!(item.class, "object.item.videoItem");
        assert_eq!(item.resources[0].url, "http://1.2.3.4:123/video");
    }

    #[test]
    fn test_parse_metadata_rejects_garbage() {
        assert!(parse_metadata("not xml at all <").is_err());
    }
}
