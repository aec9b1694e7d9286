//! # Herd daemon entry point
//!
//! Starts the replicating reverse proxy front-end and the admin API from a
//! JSON configuration file; command-line flags override file values.
//!
//! ```bash
//! # run with a config file
//! herd --config herd.conf
//!
//! # override the bind addresses and the read policy
//! herd --config herd.conf --port 7117 --api-port 7118 --round-robin
//! ```

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing::info;

use herd_admin::AdminServer;
use herd_common::{auth, Config};
use herd_metrics::MetricsRegistry;
use herd_proxy::ProxyServer;

/// herd - a replicating HTTP reverse proxy for a herd of identical REST
/// backends
#[derive(FromArgs)]
struct Cli {
    /// show version and exit
    #[argh(switch, short = 'v')]
    version: bool,

    /// path to the JSON configuration file
    #[argh(option, short = 'c', default = "\"herd.conf\".to_string()")]
    config: String,

    /// host name or IP address of the proxy front-end
    #[argh(option)]
    host: Option<String>,

    /// port number of the proxy front-end
    #[argh(option)]
    port: Option<u16>,

    /// host name or IP address of the admin API
    #[argh(option)]
    api_host: Option<String>,

    /// port number of the admin API
    #[argh(option)]
    api_port: Option<u16>,

    /// use round-robin mode for querying nodes
    #[argh(switch)]
    round_robin: bool,

    /// query nodes according to priority
    #[argh(switch)]
    by_priority: bool,

    /// check nodes every given number of seconds
    #[argh(option)]
    check_sec: Option<u64>,

    /// url used to check a node
    #[argh(option)]
    check_url: Option<String>,

    /// regexp pattern applied to the check response
    #[argh(option)]
    check_regexp: Option<String>,
}

impl Cli {
    /// File values first, flags on top.
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(api_host) = &self.api_host {
            config.api.host = api_host.clone();
        }
        if let Some(api_port) = self.api_port {
            config.api.port = api_port;
        }
        if self.round_robin {
            config.query_mode.round_robin = true;
        }
        if self.by_priority {
            config.query_mode.by_priority = true;
        }
        if let Some(seconds) = self.check_sec {
            config.health_check.seconds = seconds;
        }
        if let Some(url) = &self.check_url {
            config.health_check.url = url.clone();
        }
        if let Some(pattern) = &self.check_regexp {
            config.health_check.pattern = pattern.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();
    if cli.version {
        println!("herd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut config = Config::load(Path::new(&cli.config))
        .with_context(|| format!("loading {}", cli.config))?;
    cli.apply(&mut config);
    config.validate()?;

    let (registry, metrics) = MetricsRegistry::start();
    let authenticator = auth::from_config(config.auth.as_ref());

    let server = ProxyServer::new(config.query_mode, &config.health_check, metrics)?;
    if !server.load_nodes(config.nodes.clone()).await {
        anyhow::bail!("the nodes settings in the config have incorrect values");
    }
    info!("herd loaded with {} configured nodes", config.nodes.len());

    let admin = AdminServer::new(server.inventory(), authenticator.clone(), registry);

    let proxy_addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid proxy address {}:{}", config.host, config.port))?;
    let api_addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .with_context(|| format!("invalid API address {}:{}", config.api.host, config.api.port))?;

    tokio::select! {
        result = server.serve(proxy_addr) => result?,
        result = admin.serve(api_addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            server.shutdown().await?;
            authenticator.close();
        }
    }

    Ok(())
}
