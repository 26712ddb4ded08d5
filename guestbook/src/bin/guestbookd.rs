// Copyright (C) 2026 The guestbook authors
//
// This file is part of guestbook.
//
// guestbook is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// guestbook is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with guestbook.  If not,
// see <http://www.gnu.org/licenses/>.

//! # guestbookd
//!
//! The guestbook daemon.
//!
//! # Introduction
//!
//! `guestbookd` serves the guestbook over HTTP. On start-up it makes sure the guestbook schema
//! exists and registers itself in the instance registry; on the way down (`SIGTERM` or `SIGINT`)
//! it deregisters itself before letting the HTTP server drain. The hosting environment may also
//! stop it via `GET /_ah/stop`, which deregisters without shutting down.

use std::{
    env,
    fmt::Display,
    future::IntoFuture,
    io,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use serde::Deserialize;
use snafu::{prelude::*, IntoError};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
    sync::Notify,
};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, Layer, Registry};
use url::Url;
use uuid::Uuid;

use guestbook::{
    entities::{InstanceId, RegistryRoot},
    http::{make_world_router, Guestbook},
    lifecycle::{self, Controller, StopTrigger},
    marker_files::{self, MarkerFiles},
    navigation::{HeaderIdentity, UrlTemplate, DEFAULT_INSTANCE_URL_TEMPLATE},
    presentation::PlainHtml,
    registry::Backend as RegistryBackend,
    sqlite,
};

/// The guestbookd application error type
///
/// Note that I do not derive [Debug] for this error: `main()` returns `Result<(), Error>`, and on
/// failure the runtime prints the error's `Debug` representation. The derived implementation is
/// hard to read, so `Debug` just delegates to `Display`.
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to bind to {addr}: {source}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("Unable to read configuration file {pth:?}: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Error parsing configuration file {pth:?}: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Couldn't resolve the present working directory: {source}"))]
    CurrentDir { source: std::io::Error },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("Failed to open the marker-file registry: {source}"))]
    MarkerFiles { source: marker_files::Error },
    #[snafu(display("The HTTP server failed: {source}"))]
    Serve { source: std::io::Error },
    #[snafu(display("Failed to install a handler for {signal}: {source}"))]
    Signal {
        signal: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("Failed to open the SQLite registry: {source}"))]
    SqliteRegistry { source: sqlite::Error },
    #[snafu(display("Failed to start: {source}"))]
    Start { source: lifecycle::Error },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
    #[snafu(display("Failed to instantiate a Tokio runtime: {source}"))]
    TokioRuntime { source: std::io::Error },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

static DEFAULT_CONFIG: &str = "/etc/guestbook.toml";

static DEFAULT_DB: &str = "/tmp/guestbook.sqlite";

/// Logging-related options read from the command line or the environment
struct LogOpts {
    pub plain: bool,
    pub level: Level,
}

impl LogOpts {
    fn new(matches: &clap::ArgMatches) -> LogOpts {
        LogOpts {
            plain: matches.get_flag("plain"),
            level: match (
                matches.get_flag("debug"),
                matches.get_flag("verbose"),
                matches.get_flag("quiet"),
            ) {
                (true, _, _) => Level::TRACE,
                (false, true, _) => Level::DEBUG,
                (false, false, true) => Level::ERROR,
                (_, _, _) => Level::INFO,
            },
        }
    }
}

/// Configuration options read from the CLI (or the environment)
struct CliOpts {
    pub instance_id: InstanceId,
    pub log_opts: LogOpts,
    pub cfg: Option<PathBuf>,
}

impl CliOpts {
    fn new(matches: clap::ArgMatches) -> Result<CliOpts> {
        let here = env::current_dir().context(CurrentDirSnafu)?;
        Ok(CliOpts {
            instance_id: matches
                .get_one::<InstanceId>("instance-id")
                .cloned()
                .unwrap_or_else(|| Uuid::new_v4().into()),
            log_opts: LogOpts::new(&matches),
            cfg: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .map(|p| here.join(p)),
        })
    }
}

/// Instance registry configuration
///
/// Every instance that should see the others must point at the same registry, with the same root.
#[derive(Clone, Debug, Deserialize)]
pub enum RegistryConfig {
    /// Keep presence records in a SQLite table
    Sqlite {
        /// The database file; may be the guestbook database itself
        path: PathBuf,
        #[serde(default)]
        root: RegistryRoot,
    },
    /// Keep presence records as empty files in `directory`/`root`
    MarkerFiles {
        directory: PathBuf,
        #[serde(default)]
        root: RegistryRoot,
    },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::Sqlite {
            path: PathBuf::from(DEFAULT_DB),
            root: RegistryRoot::default(),
        }
    }
}

/// guestbookd configuration, version one
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
struct ConfigV1 {
    /// Local address at which to listen for requests; specify as "address:port"
    #[serde(rename = "public-address")]
    public_address: SocketAddr,
    /// The SQLite file holding the guestbook; every instance must share it
    #[serde(rename = "guestbook-db")]
    guestbook_db: PathBuf,
    registry: RegistryConfig,
    /// Number of entries shown on the guestbook page; zero means "all of them"
    #[serde(rename = "posts-per-page")]
    posts_per_page: usize,
    /// Upper bound on the time spent deregistering at shutdown
    #[serde(rename = "deregister-timeout-ms")]
    deregister_timeout_ms: u64,
    /// If true, failure to register at start-up is fatal; otherwise it's logged & we serve anyway
    #[serde(rename = "require-registration")]
    require_registration: bool,
    /// Template for links to other instances; may use `{instance}`, `{version}` & `{hostname}`
    #[serde(rename = "instance-url-template")]
    instance_url_template: String,
    #[serde(rename = "version-name")]
    version_name: String,
    hostname: String,
    /// Request header in which an upstream proxy names the authenticated user
    #[serde(rename = "user-header")]
    user_header: String,
    #[serde(rename = "login-url")]
    login_url: Url,
    #[serde(rename = "logout-url")]
    logout_url: Url,
}

impl Default for ConfigV1 {
    fn default() -> Self {
        ConfigV1 {
            public_address: "0.0.0.0:8080".parse::<SocketAddr>().unwrap(/* known good */),
            guestbook_db: PathBuf::from(DEFAULT_DB),
            registry: RegistryConfig::default(),
            posts_per_page: 20,
            deregister_timeout_ms: lifecycle::DEFAULT_DEREGISTER_TIMEOUT.as_millis() as u64,
            require_registration: false,
            instance_url_template: DEFAULT_INSTANCE_URL_TEMPLATE.to_owned(),
            version_name: "1".to_owned(),
            hostname: "localhost:8080".to_owned(),
            user_header: "x-guestbook-user".to_owned(),
            login_url: Url::parse("http://localhost:8080/login").unwrap(/* known good */),
            logout_url: Url::parse("http://localhost:8080/logout").unwrap(/* known good */),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "version")] // tag "internally"
enum Configuration {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

/// Parse the guestbookd configuration file
///
/// A missing file at the default location just means "use the defaults"; a missing file the
/// operator named explicitly is an error.
fn parse_config(cfg: &Option<PathBuf>) -> Result<ConfigV1> {
    let (pth, defaulted): (PathBuf, bool) = cfg.as_ref().map_or_else(
        || (PathBuf::from_str(DEFAULT_CONFIG).unwrap(/* known good */), true),
        |p| (p.clone(), false),
    );
    match std::fs::read_to_string(&pth) {
        Ok(text) => match toml::from_str::<Configuration>(&text) {
            Ok(cfg) => match cfg {
                Configuration::V1(cfg) => Ok(cfg),
            },
            Err(err) => Err(ConfigParseSnafu { pth }.into_error(err)),
        },
        Err(err) => {
            if defaulted && err.kind() == io::ErrorKind::NotFound {
                Ok(ConfigV1::default())
            } else {
                Err(ConfigNotFoundSnafu { pth }.into_error(err))
            }
        }
    }
}

/// Configure guestbookd logging
///
/// We always log to stdout: JSON by default, or a compact human-readable format with `--plain`.
/// `RUST_LOG`, if set, overrides the level chosen on the command line.
fn configure_logging(
    logopts: &LogOpts,
) -> Result<(Box<dyn Layer<Registry> + Send + Sync>, EnvFilter)> {
    let filter = EnvFilter::builder()
        .with_default_directive(logopts.level.into())
        .from_env()
        .context(EnvFilterSnafu)?;

    // `json()` & `compact()` produce layers of different types, hence the box.
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if logopts.plain {
        Box::new(fmt::Layer::default().compact().with_writer(io::stdout))
    } else {
        Box::new(
            fmt::Layer::default()
                .json()
                .with_current_span(true)
                .with_writer(io::stdout),
        )
    };

    Ok((formatter, filter))
}

/// Open the configured instance registry
async fn select_registry(
    config: &RegistryConfig,
) -> Result<Arc<dyn RegistryBackend + Send + Sync>> {
    match config {
        RegistryConfig::Sqlite { path, root } => {
            let registry = sqlite::Registry::new(sqlite::Database::new(path), root.clone())
                .await
                .context(SqliteRegistrySnafu)?;
            Ok(Arc::new(registry))
        }
        RegistryConfig::MarkerFiles { directory, root } => {
            let registry = MarkerFiles::new(directory, root)
                .await
                .context(MarkerFilesSnafu)?;
            Ok(Arc::new(registry))
        }
    }
}

/// Serve guestbook requests until asked to terminate
#[tracing::instrument(skip(opts, cfg), fields(instance_id = %opts.instance_id))]
async fn serve(opts: CliOpts, cfg: ConfigV1) -> Result<()> {
    // Produce a future which can be used to signal graceful shutdown, below.
    async fn shutdown_signal(nfy: Arc<Notify>) {
        nfy.notified().await
    }

    fn log_on_err<T, E>(x: StdResult<T, E>)
    where
        E: std::error::Error + std::fmt::Debug,
    {
        if let Err(err) = x {
            error!("{:?}", err);
        }
    }

    let mut sigterm =
        signal(SignalKind::terminate()).context(SignalSnafu { signal: "SIGTERM" })?;
    let mut sigint = signal(SignalKind::interrupt()).context(SignalSnafu { signal: "SIGINT" })?;

    let storage = Arc::new(sqlite::Database::new(&cfg.guestbook_db));
    let registry = select_registry(&cfg.registry).await?;
    let lifecycle = Arc::new(Controller::new(
        opts.instance_id.clone(),
        storage.clone(),
        registry.clone(),
        Duration::from_millis(cfg.deregister_timeout_ms),
    ));

    match lifecycle.start().await {
        Ok(state) => debug!("Lifecycle state: {}", state),
        // No schema means no guestbook; that's always fatal.
        Err(err @ lifecycle::Error::Schema { .. }) => return Err(StartSnafu.into_error(err)),
        Err(err) if cfg.require_registration => return Err(StartSnafu.into_error(err)),
        Err(err) => warn!(
            "{}; serving anyway. This instance won't be listed until `/_ah/start` succeeds.",
            err
        ),
    }

    let state = Arc::new(Guestbook {
        storage,
        registry,
        lifecycle: lifecycle.clone(),
        templates: Box::new(PlainHtml),
        identity: Box::new(HeaderIdentity::new(
            &cfg.user_header,
            cfg.login_url.clone(),
            cfg.logout_url.clone(),
        )),
        locator: Box::new(UrlTemplate::new(
            &cfg.instance_url_template,
            &cfg.version_name,
            &cfg.hostname,
        )),
        posts_per_page: cfg.posts_per_page,
    });

    let nfy = Arc::new(Notify::new());
    let mut server = axum::serve(
        TcpListener::bind(cfg.public_address)
            .await
            .context(BindSnafu {
                addr: cfg.public_address,
            })?,
        make_world_router(state),
    )
    .with_graceful_shutdown(shutdown_signal(nfy.clone()))
    .into_future();

    info!("Listening on {}.", cfg.public_address);

    let signame = tokio::select! {
        res = &mut server => {
            // Shouldn't happen, but if it does, still try to leave the registry clean.
            error!("The HTTP server exited unexpectedly; deregistering.");
            lifecycle.stop(StopTrigger::ShutdownHook).await;
            return res.context(ServeSnafu);
        }
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    info!("Received {}; deregistering & shutting down.", signame);
    // Deregister first: the drain may take a while, and we don't want to be listed meanwhile.
    let state = lifecycle.stop(StopTrigger::ShutdownHook).await;
    debug!("Lifecycle state: {}", state);
    nfy.notify_one();
    log_on_err(server.await);

    Ok(())
}

/// Configure logging, then call `serve()`
///
/// Logging is configured *before* we call `serve()` since it's instrumented (if we don't, the span
/// that's created on entry to `serve()` is ignored).
async fn go_async(
    opts: CliOpts,
    bootstrap_logging_guard: tracing::dispatcher::DefaultGuard,
) -> Result<()> {
    fn go_async1(
        opts: &CliOpts,
    ) -> Result<(ConfigV1, Box<dyn Layer<Registry> + Send + Sync>, EnvFilter)> {
        let cfg = parse_config(&opts.cfg)?;
        let (formatter, filter) = configure_logging(&opts.log_opts)?;
        Ok((cfg, formatter, filter))
    }

    match go_async1(&opts) {
        Ok((cfg, formatter, filter)) => {
            // Nb. this can only be invoked once
            tracing::subscriber::set_global_default(
                Registry::default().with(formatter).with(filter),
            )
            .context(SubscriberSnafu)?;
            // Drop the guard, cleaning-up the bootstrap logger
            drop(bootstrap_logging_guard);

            info!(
                "guestbookd version {}, instance {} starting.",
                crate_version!(),
                opts.instance_id
            );

            serve(opts, cfg).await
        }
        Err(err) => {
            error!("While configuring logging: {err:?}");
            Err(err)
        }
    }
}

fn main() -> Result<()> {
    // Most configuration is read from file; the command-line options govern where to find that file
    // & how to log before it's been read. They all have corresponding environment variables for the
    // sake of convenience when running in a container.
    let opts = CliOpts::new(
        Command::new("guestbookd")
            .version(crate_version!())
            .about("A multi-instance web guestbook")
            .long_about(
                "`guestbookd` serves a guestbook backed by a shared SQLite file, and lists the \
                 other instances registered alongside it.",
            )
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .num_args(1)
                    .value_parser(value_parser!(PathBuf))
                    .env("GUESTBOOK_CONFIG")
                    .help(
                        "path (absolute or relative to the process' current directory) to a \
                         configuration file",
                    ),
            )
            .arg(
                Arg::new("debug")
                    .short('D')
                    .long("debug")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GUESTBOOK_DEBUG")
                    .help("produce debug output"),
            )
            .arg(
                Arg::new("instance-id")
                    .short('I')
                    .long("instance-id")
                    .num_args(1)
                    .value_parser(value_parser!(InstanceId))
                    .env("GUESTBOOK_INSTANCE_ID")
                    .help("Instance ID, as assigned by the hosting environment")
                    .long_help(
                        "Instance ID
The name under which this instance registers itself. If not given, a random UUID will be used.",
                    ),
            )
            .arg(
                Arg::new("plain")
                    .short('p')
                    .long("plain")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GUESTBOOK_PLAIN")
                    .help("log in human-readable format, not JSON/structured logging"),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GUESTBOOK_QUIET")
                    .help("produce only error output"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GUESTBOOK_VERBOSE")
                    .help("produce prolix output"),
            )
            .get_matches(),
    )?;

    // Until the configuration file has been read, log to stderr via a *temporary* subscriber (see
    // <https://github.com/tokio-rs/tracing/issues/2903>).
    let bootstrap_subscriber = Registry::default()
        .with(fmt::Layer::default().with_writer(io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(opts.log_opts.level.into())
                .from_env()
                .context(EnvFilterSnafu)?,
        );
    let bootstrap_logging_guard = tracing::subscriber::set_default(bootstrap_subscriber);
    debug!("Temporarily logging to stderr while initializing.");

    tokio::runtime::Runtime::new()
        .context(TokioRuntimeSnafu)?
        .block_on(go_async(opts, bootstrap_logging_guard))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = match toml::from_str::<Configuration>(
            r#"version = "1"
posts-per-page = 5

[registry.MarkerFiles]
directory = "/var/lib/guestbook/registry"
"#,
        )
        .unwrap()
        {
            Configuration::V1(cfg) => cfg,
        };
        assert_eq!(cfg.posts_per_page, 5);
        assert_eq!(cfg.deregister_timeout_ms, 5000);
        assert!(!cfg.require_registration);
        match cfg.registry {
            RegistryConfig::MarkerFiles { directory, root } => {
                assert_eq!(directory, PathBuf::from("/var/lib/guestbook/registry"));
                assert_eq!(root, RegistryRoot::default());
            }
            _ => panic!("Expected a marker-file registry"),
        }
    }

    #[test]
    fn config_files() {
        let dir = tempfile::tempdir().unwrap();
        // A named file must exist
        assert!(parse_config(&Some(dir.path().join("nope.toml"))).is_err());

        let pth = dir.path().join("guestbook.toml");
        std::fs::write(&pth, "version = \"2\"\n").unwrap();
        assert!(parse_config(&Some(pth.clone())).is_err());

        std::fs::write(
            &pth,
            "version = \"1\"\nrequire-registration = true\n[registry.Sqlite]\npath = \"/tmp/x.db\"\nroot = \"Elsewhere\"\n",
        )
        .unwrap();
        let cfg = parse_config(&Some(pth)).unwrap();
        assert!(cfg.require_registration);
        assert!(matches!(
            cfg.registry,
            RegistryConfig::Sqlite { ref root, .. } if &**root == "Elsewhere"
        ));
    }
}
