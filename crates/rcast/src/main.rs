use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use dmr_serve::{DmrServer, DmrServerOptions};
use network_interface::NetworkInterfaceConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_HTTP_PORT: u16 = 8200;
const HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Parser)]
#[command(version, author, about)]
struct Opts {
    /// The console loglevel
    #[arg(value_enum, short = 'v', env = "DMR_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// The name controllers show in their device pickers.
    #[arg(
        long = "friendly-name",
        default_value = "RCast Renderer",
        env = "DMR_FRIENDLY_NAME"
    )]
    friendly_name: String,
}

/// The `DMR_*` environment table. Parsed tolerantly: values that don't
/// parse revert to their defaults instead of refusing to start, so a
/// typo'd launchd plist still brings the renderer up.
#[derive(Debug, PartialEq, Eq)]
struct Config {
    uuid_path: PathBuf,
    allow_session_preempt: bool,
    link_system_volume: bool,
    http_port: u16,
    player_fullscreen: bool,
}

impl Config {
    fn load() -> Self {
        Self::from_env(|key| std::env::var(key).ok())
    }

    fn from_env(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            uuid_path: get("DMR_UUID_PATH")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_uuid_path),
            allow_session_preempt: env_bool(&get, "DMR_ALLOW_PREEMPT", true),
            link_system_volume: env_bool(&get, "DMR_LINK_SYSTEM_VOLUME", false),
            http_port: env_port(&get, "DMR_HTTP_PORT", DEFAULT_HTTP_PORT),
            player_fullscreen: env_bool(&get, "DMR_IINA_FULLSCREEN", false),
        }
    }
}

fn env_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match get(key).as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => match value.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => true,
            "0" | "f" | "false" => false,
            _ => default,
        },
        _ => default,
    }
}

fn env_port(get: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    get(key)
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|port| *port >= 1)
        .unwrap_or(default)
}

fn default_uuid_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".local/rcast/dmr_uuid.txt"))
        .unwrap_or_else(|| PathBuf::from("./dmr_uuid.txt"))
}

/// The persisted device identity: one `uuid:<v4>` line. A fresh UUID is
/// generated and written on first boot (directory 0755, file 0644,
/// independent of the process umask); whatever is read back gets the
/// `uuid:` prefix ensured so hand-edited files still work.
fn load_or_create_uuid(path: &Path) -> anyhow::Result<String> {
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    if let Ok(content) = std::fs::read_to_string(path) {
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            return Ok(ensure_uuid_prefix(trimmed));
        }
    }
    let fresh = format!("uuid:{}", uuid::Uuid::new_v4());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("error creating {parent:?}"))?;
        #[cfg(unix)]
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("error setting permissions on {parent:?}"))?;
    }
    std::fs::write(path, format!("{fresh}\n")).with_context(|| format!("error writing {path:?}"))?;
    #[cfg(unix)]
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
        .with_context(|| format!("error setting permissions on {path:?}"))?;
    Ok(fresh)
}

fn ensure_uuid_prefix(value: &str) -> String {
    if value.starts_with("uuid:") {
        value.to_owned()
    } else {
        format!("uuid:{value}")
    }
}

/// First non-loopback, non-link-local IPv4 on any interface: the address
/// controllers will be told to reach us on.
fn first_usable_ipv4() -> anyhow::Result<Ipv4Addr> {
    let interfaces = network_interface::NetworkInterface::show()
        .context("error listing network interfaces")?;
    for nic in interfaces {
        for addr in nic.addr {
            if let std::net::IpAddr::V4(ip) = addr.ip()
                && !ip.is_loopback()
                && !ip.is_link_local()
                && !ip.is_unspecified()
            {
                return Ok(ip);
            }
        }
    }
    bail!("no usable IPv4 address found")
}

fn init_logging(opts: &Opts) {
    let default_level = match opts.log_level.unwrap_or(LogLevel::Info) {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;

    let token = CancellationToken::new();
    #[cfg(not(target_os = "windows"))]
    {
        let token = token.clone();
        use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            let mut cancel_triggered = false;
            for sig in signals.forever() {
                if cancel_triggered {
                    warn!("received signal {sig:?}, forcing shutdown");
                    std::process::exit(1)
                }
                warn!("received signal {sig:?}, trying to shut down gracefully");
                token.cancel();
                cancel_triggered = true;

                std::thread::spawn(|| {
                    std::thread::sleep(Duration::from_secs(5));
                    warn!("could not shutdown in time, killing myself");
                    std::process::exit(1)
                });
            }
        });
    }

    let result = rt.block_on(async_main(opts, token.clone()));
    if let Err(e) = result.as_ref() {
        error!("error running rcast: {e:?}");
    }
    rt.shutdown_timeout(Duration::from_secs(1));
    match result {
        Ok(_) => std::process::exit(0),
        Err(_) => std::process::exit(1),
    }
}

async fn async_main(opts: Opts, cancel: CancellationToken) -> anyhow::Result<()> {
    init_logging(&opts);

    let config = Config::load();

    let udn = match load_or_create_uuid(&config.uuid_path) {
        Ok(udn) => udn,
        Err(e) => {
            warn!("error persisting device UUID, using a transient one: {e:#}");
            format!("uuid:{}", uuid::Uuid::new_v4())
        }
    };

    let ip = first_usable_ipv4().context("cannot start without a usable IPv4 address")?;
    let base_url = format!("http://{ip}:{}", config.http_port);
    info!(udn, base_url, "starting renderer");

    let server = Arc::new(DmrServer::new(DmrServerOptions {
        friendly_name: opts.friendly_name,
        udn,
        base_url,
        allow_session_preempt: config.allow_session_preempt,
        link_system_volume: config.link_system_volume,
        player_fullscreen: config.player_fullscreen,
        shutdown: cancel.clone(),
    }));

    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port));
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("error binding HTTP server to {listen_addr}"))?;
    info!("HTTP listening on {listen_addr}");

    let app = server
        .axum_router
        .clone()
        .into_make_service_with_connect_info::<SocketAddr>();
    let mut http_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .context("error running HTTP server")
        }
    });
    let mut ssdp_task = tokio::spawn({
        let server = server.clone();
        async move { server.run_ssdp_forever().await }
    });

    tokio::select! {
        _ = cancel.cancelled() => {}
        r = &mut http_task => {
            r.context("HTTP task died")??;
            bail!("HTTP server exited unexpectedly");
        }
        r = &mut ssdp_task => {
            r.context("SSDP task died")??;
            bail!("SSDP runner exited unexpectedly");
        }
    }

    // Bounded teardown: let the HTTP server drain and SSDP say byebye,
    // then stop every player instance.
    info!("shutting down");
    let drain = async {
        let (http, ssdp) = tokio::join!(&mut http_task, &mut ssdp_task);
        for result in [http, ssdp] {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("error during shutdown: {e:#}"),
                Err(e) => warn!("task died during shutdown: {e}"),
            }
        }
    };
    if tokio::time::timeout(HTTP_SHUTDOWN_TIMEOUT, drain).await.is_err() {
        warn!("graceful shutdown timed out");
        http_task.abort();
        ssdp_task.abort();
    }

    server.state.renderer.stop_all().await;
    info!("bye");
    Ok(())
}
