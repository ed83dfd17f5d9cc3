pub struct RootDescriptionInputs<'a> {
    pub friendly_name: &'a str,
    pub udn: &'a str,
    pub base_url: &'a str,
}

pub fn render_root_description_xml(input: &RootDescriptionInputs<'_>) -> String {
    format!(
        include_str!("resources/templates/root_desc.tmpl.xml"),
        friendly_name = input.friendly_name,
        udn = input.udn,
        base_url = input.base_url,
    )
}

pub const AVTRANSPORT_SCPD_XML: &str = include_str!("resources/templates/avtransport_scpd.xml");
pub const RENDERING_CONTROL_SCPD_XML: &str =
    include_str!("resources/templates/renderingcontrol_scpd.xml");
pub const CONNECTION_MANAGER_SCPD_XML: &str =
    include_str!("resources/templates/connectionmanager_scpd.xml");

#[cfg(test)]
mod tests {
    use super::{RootDescriptionInputs, render_root_description_xml};

    #[test]
    fn test_render_root_description() {
        let xml = render_root_description_xml(&RootDescriptionInputs {
            friendly_name: "RCast Renderer",
            udn: "uuid:12345678-90ab-cdef-1234-567890abcdef",
            base_url: "http://192.168.1.5:8200",
        });
        assert!(xml.contains("<friendlyName>RCast Renderer</friendlyName>"));
        assert!(xml.contains("<UDN>uuid:12345678-90ab-cdef-1234-567890abcdef</UDN>"));
        assert!(xml.contains("urn:schemas-upnp-org:service:AVTransport:1"));
        assert!(xml.contains("urn:schemas-upnp-org:service:RenderingControl:1"));
        assert!(xml.contains("urn:schemas-upnp-org:service:ConnectionManager:1"));
        assert!(xml.contains("<presentationURL>http://192.168.1.5:8200/</presentationURL>"));
    }
}
