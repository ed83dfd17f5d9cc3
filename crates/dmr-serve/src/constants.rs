pub const UPNP_DEVICE_ROOT: &str = "upnp:rootdevice";
pub const UPNP_DEVICE_MEDIARENDERER: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

pub const UPNP_SERVICE_AVTRANSPORT: &str = "urn:schemas-upnp-org:service:AVTransport:1";
pub const UPNP_SERVICE_RENDERING_CONTROL: &str =
    "urn:schemas-upnp-org:service:RenderingControl:1";
pub const UPNP_SERVICE_CONNECTION_MANAGER: &str =
    "urn:schemas-upnp-org:service:ConnectionManager:1";

pub const SERVER_STRING: &str = "RCast-DMR/1.1";

// SOAP responses use text/xml per the UPnP device architecture; the
// descriptor documents are served as application/xml.
pub const CONTENT_TYPE_XML_UTF8: &str = "text/xml; charset=\"utf-8\"";
pub const CONTENT_TYPE_DESCRIPTION_XML: &str = "application/xml; charset=utf-8";
