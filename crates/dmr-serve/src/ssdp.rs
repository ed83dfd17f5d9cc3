//! SSDP presence announcements and M-SEARCH responses for the renderer,
//! IPv4 multicast only.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, SystemTime};

use anyhow::{Context, bail};
use bstr::BStr;
use network_interface::NetworkInterfaceConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::constants::{
    UPNP_DEVICE_MEDIARENDERER, UPNP_DEVICE_ROOT, UPNP_SERVICE_AVTRANSPORT,
    UPNP_SERVICE_CONNECTION_MANAGER, UPNP_SERVICE_RENDERING_CONTROL,
};

const SSDP_PORT: u16 = 1900;
const SSDP_MCAST_IPV4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_MCAST_ADDR: SocketAddrV4 = SocketAddrV4::new(SSDP_MCAST_IPV4, SSDP_PORT);

const NTS_ALIVE: &str = "ssdp:alive";
const NTS_BYEBYE: &str = "ssdp:byebye";

const ST_ALL: &str = "ssdp:all";

const CACHE_MAX_AGE: u32 = 1800;

#[derive(Debug)]
pub enum SsdpMessage<'a, 'h> {
    MSearch(SsdpMSearchRequest<'a>),
    #[allow(dead_code)]
    OtherRequest(httparse::Request<'h, 'a>),
    #[allow(dead_code)]
    Response(httparse::Response<'h, 'a>),
}

#[derive(Debug)]
pub struct SsdpMSearchRequest<'a> {
    #[allow(dead_code)]
    pub host: Option<&'a BStr>,
    pub man: &'a BStr,
    pub st: &'a BStr,
}

impl SsdpMSearchRequest<'_> {
    /// MAN must be the quoted string `"ssdp:discover"`; compared
    /// case-insensitively, quotes required.
    fn is_discover(&self) -> bool {
        std::str::from_utf8(self.man)
            .map(|man| man.trim().eq_ignore_ascii_case("\"ssdp:discover\""))
            .unwrap_or(false)
    }
}

pub fn try_parse_ssdp<'a, 'h>(
    buf: &'a [u8],
    headers: &'h mut [httparse::Header<'a>],
) -> anyhow::Result<SsdpMessage<'a, 'h>> {
    if buf.starts_with(b"HTTP/") {
        let mut resp = httparse::Response::new(headers);
        resp.parse(buf).context("error parsing response")?;
        return Ok(SsdpMessage::Response(resp));
    }

    let mut req = httparse::Request::new(headers);
    req.parse(buf).context("error parsing request")?;

    match req.method {
        Some("M-SEARCH") => {
            let mut host = None;
            let mut man = None;
            let mut st = None;

            for header in req.headers.iter() {
                if header.name.eq_ignore_ascii_case("HOST") {
                    host = Some(header.value);
                } else if header.name.eq_ignore_ascii_case("MAN") {
                    man = Some(header.value);
                } else if header.name.eq_ignore_ascii_case("ST") {
                    st = Some(header.value);
                } else {
                    trace!(header = ?BStr::new(header.name), "ignoring SSDP header");
                }
            }

            match (man, st) {
                (Some(man), Some(st)) => Ok(SsdpMessage::MSearch(SsdpMSearchRequest {
                    host: host.map(BStr::new),
                    man: BStr::new(man),
                    st: BStr::new(st),
                })),
                _ => bail!("not all of man and st are set"),
            }
        }
        _ => Ok(SsdpMessage::OtherRequest(req)),
    }
}

pub struct SsdpRunnerOptions {
    /// `uuid:<v4>`, as advertised in USN and UDN.
    pub udn: String,
    /// Absolute URL of the device description document.
    pub description_location: String,
    pub server_string: String,
    pub notify_interval: Duration,
    pub shutdown: CancellationToken,
}

impl SsdpRunnerOptions {
    /// Every NT we announce, with its USN. The bare UUID announces as
    /// itself; everything else as `<UUID>::<NT>`.
    fn advertised_targets(&self) -> Vec<(String, String)> {
        [
            UPNP_DEVICE_ROOT,
            UPNP_DEVICE_MEDIARENDERER,
            UPNP_SERVICE_AVTRANSPORT,
            UPNP_SERVICE_RENDERING_CONTROL,
            UPNP_SERVICE_CONNECTION_MANAGER,
        ]
        .iter()
        .map(|nt| (nt.to_string(), format!("{}::{}", self.udn, nt)))
        .chain(std::iter::once((self.udn.clone(), self.udn.clone())))
        .collect()
    }

    /// The USN to answer a search with, or None when the ST isn't ours.
    fn search_response_usn(&self, st: &str) -> Option<String> {
        if st == ST_ALL || st == self.udn {
            return Some(self.udn.clone());
        }
        let advertised = st == UPNP_DEVICE_ROOT
            || st == UPNP_DEVICE_MEDIARENDERER
            || st == UPNP_SERVICE_AVTRANSPORT
            || st == UPNP_SERVICE_RENDERING_CONTROL
            || st == UPNP_SERVICE_CONNECTION_MANAGER;
        advertised.then(|| format!("{}::{}", self.udn, st))
    }

    fn generate_notify_message(&self, nt: &str, usn: &str, nts: &str) -> String {
        if nts == NTS_BYEBYE {
            return format!(
                "NOTIFY * HTTP/1.1\r\nHOST: {SSDP_MCAST_ADDR}\r\nNT: {nt}\r\nNTS: {nts}\r\nUSN: {usn}\r\n\r\n"
            );
        }
        format!(
            "NOTIFY * HTTP/1.1\r\n\
             HOST: {SSDP_MCAST_ADDR}\r\n\
             CACHE-CONTROL: max-age={CACHE_MAX_AGE}\r\n\
             LOCATION: {location}\r\n\
             NT: {nt}\r\n\
             NTS: {nts}\r\n\
             SERVER: {server}\r\n\
             USN: {usn}\r\n\
             BOOTID.UPNP.ORG: 1\r\n\
             CONFIGID.UPNP.ORG: 1\r\n\r\n",
            location = self.description_location,
            server = self.server_string,
        )
    }

    fn generate_search_response(&self, st: &str, usn: &str) -> String {
        let date = httpdate::fmt_http_date(SystemTime::now());
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age={CACHE_MAX_AGE}\r\n\
             DATE: {date}\r\n\
             EXT:\r\n\
             LOCATION: {location}\r\n\
             SERVER: {server}\r\n\
             ST: {st}\r\n\
             USN: {usn}\r\n\
             BOOTID.UPNP.ORG: 1\r\n\
             CONFIGID.UPNP.ORG: 1\r\n\r\n",
            location = self.description_location,
            server = self.server_string,
        )
    }
}

pub struct SsdpRunner {
    opts: SsdpRunnerOptions,
    socket: Option<tokio::net::UdpSocket>,
}

/// Bind :1900 with address reuse and join the group on every private IPv4
/// interface (plus the default), so searches reach us regardless of which
/// NIC the controller sits on.
fn bind_ssdp_socket() -> anyhow::Result<tokio::net::UdpSocket> {
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT).into();
    let sock = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::DGRAM, None)
        .context("error creating socket")?;
    #[cfg(not(target_os = "windows"))]
    sock.set_reuse_port(true)
        .context("error setting SO_REUSEPORT")?;
    sock.set_reuse_address(true)
        .context("error setting SO_REUSEADDR")?;
    sock.bind(&bind_addr.into())
        .context(bind_addr)
        .context("error binding")?;
    sock.set_nonblocking(true)?;

    let socket = tokio::net::UdpSocket::from_std(sock.into())
        .context("error converting socket2 socket to tokio")?;

    let default_membership = std::iter::once(Ipv4Addr::UNSPECIFIED);
    let nic_memberships = network_interface::NetworkInterface::show()
        .into_iter()
        .flatten()
        .flat_map(|nic| nic.addr.into_iter())
        .filter_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(ip) if ip.is_private() && !ip.is_loopback() => Some(ip),
            _ => None,
        });

    let mut joined = 0;
    for ifaddr in default_membership.chain(nic_memberships) {
        trace!(multiaddr = ?SSDP_MCAST_IPV4, interface = ?ifaddr, "joining multicast group");
        match socket.join_multicast_v4(SSDP_MCAST_IPV4, ifaddr) {
            Ok(()) => joined += 1,
            Err(e) => {
                debug!(multiaddr = ?SSDP_MCAST_IPV4, interface = ?ifaddr, "error joining multicast group: {e:#}")
            }
        }
    }
    if joined == 0 {
        bail!("could not join the SSDP multicast group on any interface");
    }

    Ok(socket)
}

impl SsdpRunner {
    /// A bind/join failure disables discovery but never takes the process
    /// down: the control plane stays reachable for controllers that
    /// already know us.
    pub fn new(opts: SsdpRunnerOptions) -> Self {
        let socket = bind_ssdp_socket()
            .map_err(|e| warn!("error creating SSDP socket, discovery disabled: {e:#}"))
            .ok();
        Self { opts, socket }
    }

    async fn try_send_notifies(&self, nts: &str) {
        let Some(socket) = &self.socket else { return };
        for (nt, usn) in self.opts.advertised_targets() {
            let msg = self.opts.generate_notify_message(&nt, &usn, nts);
            if let Err(e) = socket.send_to(msg.as_bytes(), SSDP_MCAST_ADDR).await {
                debug!(nt, "error sending SSDP notify: {e:#}");
            }
        }
    }

    async fn task_send_alive_notifies_periodically(&self) {
        let mut interval = tokio::time::interval(self.opts.notify_interval);
        loop {
            interval.tick().await;
            self.try_send_notifies(NTS_ALIVE).await;
        }
    }

    async fn process_incoming_message(
        &self,
        msg: &[u8],
        socket: &tokio::net::UdpSocket,
        addr: SocketAddr,
    ) -> anyhow::Result<()> {
        let mut headers = [httparse::EMPTY_HEADER; 16];
        trace!(content = ?BStr::new(msg), ?addr, "received message");
        let msg = match try_parse_ssdp(msg, &mut headers) {
            Ok(SsdpMessage::MSearch(msg)) => msg,
            Ok(other) => {
                trace!("ignoring {other:?}");
                return Ok(());
            }
            Err(e) => {
                debug!("error parsing SSDP message: {e:#}");
                return Ok(());
            }
        };
        if !msg.is_discover() {
            trace!("not an ssdp:discover request, ignoring");
            return Ok(());
        }

        let Ok(st) = std::str::from_utf8(msg.st) else {
            return Ok(());
        };
        let st = st.trim();
        let Some(usn) = self.opts.search_response_usn(st) else {
            trace!(st, "search target isn't ours, ignoring");
            return Ok(());
        };

        let response = self.opts.generate_search_response(st, &usn);
        trace!(content = response, ?addr, "sending SSDP search response");
        socket
            .send_to(response.as_bytes(), addr)
            .await
            .context("error sending")?;
        Ok(())
    }

    async fn task_respond_on_msearches(&self) {
        let Some(socket) = &self.socket else { return };
        let mut buf = vec![0u8; 16184];

        loop {
            let (sz, addr) = match socket.recv_from(&mut buf).await {
                Ok((sz, addr)) => (sz, addr),
                Err(e) => {
                    warn!("error receiving SSDP datagram: {e:#}");
                    continue;
                }
            };
            if let Err(e) = self.process_incoming_message(&buf[..sz], socket, addr).await {
                warn!(?addr, "error processing incoming SSDP message: {e:#}");
            }
        }
    }

    /// Announce and respond until shutdown, then say goodbye.
    pub async fn run_forever(&self) -> anyhow::Result<()> {
        let t1 = self.task_respond_on_msearches();
        let t2 = self.task_send_alive_notifies_periodically();

        let wait = async move {
            tokio::join!(t1, t2);
        };

        tokio::select! {
            _ = wait => Ok(()),
            _ = self.opts.shutdown.cancelled() => {
                self.try_send_notifies(NTS_BYEBYE).await;
                Ok(())
            }
        }
    }
}
