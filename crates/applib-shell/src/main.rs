//! applib headless host.
//!
//! Stands in for the native window host: renders the composed UI to the log,
//! relays stdin lines to the session as host messages, and exposes the
//! offline cache and client props from the command line.

mod cli;
mod render;

use anyhow::{Context, bail};
use applib_client::{
    ClientConfig, ClientProps, ClientSession, DirStore, HttpSource, OfflineCacheManager, PlacemarkWindow, Poller,
    WsConnector, host_channel,
};
use clap::Parser;
use cli::{CacheAction, Cli, Command, PropAction};
use render::{LogLayer, LogRenderer};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("applib=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Run => run(&config).await,
        Command::Query {
            query,
            callback,
            timeout_ms,
        } => query_once(&config, &query, &callback, Duration::from_millis(timeout_ms)).await,
        Command::Cache { action } => cache(&config, action).await,
        Command::Prop { action } => prop(&config, action),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => match dirs::config_dir() {
            Some(dir) => ClientConfig::load(&dir.join("applib").join("config.toml"))?,
            None => ClientConfig::default(),
        },
    };
    if let Some(url) = &cli.server_url {
        config.server_url = url.clone();
    }
    Ok(config)
}

fn props_path(config: &ClientConfig) -> Option<PathBuf> {
    config
        .props_path
        .clone()
        .or_else(|| dirs::config_dir().map(|d| d.join("applib").join("props.json")))
}

fn open_props(config: &ClientConfig) -> ClientProps {
    match props_path(config) {
        Some(path) => ClientProps::load(path),
        None => ClientProps::in_memory(),
    }
}

fn start_session(config: &ClientConfig) -> anyhow::Result<ClientSession> {
    let ws_url = config.websocket_url()?;
    tracing::info!("Connecting to {}", ws_url);
    Ok(ClientSession::start(WsConnector::new(ws_url.as_str()), open_props(config)))
}

async fn run(config: &ClientConfig) -> anyhow::Result<()> {
    let (bridge, mut host) = host_channel();
    let mut session = start_session(config)?.with_host(bridge);
    session.ui_mut().attach_renderer(Box::new(LogRenderer));
    session.on_host_message(Box::new(|message: &str| {
        tracing::info!("host -> view: {}", message);
    }));

    if let Some(poll) = &config.poll {
        let window = PlacemarkWindow::new(LogLayer);
        session
            .protocol_mut()
            .register_callback(poll.callback.clone(), window.into_handler());
        session = session.with_poller(Poller::from_config(poll));
    }

    // Host side: stdin lines go to the view, view posts go to the log.
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        host.post(line);
                    }
                    _ => break,
                },
                posted = host.recv() => match posted {
                    Some(message) => tracing::info!("view -> host: {}", message),
                    None => break,
                },
            }
        }
    });

    tokio::select! {
        () = session.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            tracing::info!("Interrupted, shutting down");
            session.shutdown();
            session.connection().closed().await;
        }
    }
    Ok(())
}

async fn query_once(config: &ClientConfig, query: &str, callback: &str, timeout: Duration) -> anyhow::Result<()> {
    let mut session = start_session(config)?;
    let (reply_tx, mut reply_rx) = oneshot::channel::<Value>();
    let mut reply_tx = Some(reply_tx);
    session.protocol_mut().request_with_callback(
        query,
        callback,
        Box::new(move |data: &Value| {
            if let Some(tx) = reply_tx.take() {
                let _ = tx.send(data.clone());
            }
        }),
    )?;

    let wait = async {
        loop {
            tokio::select! {
                reply = &mut reply_rx => return reply.ok(),
                running = session.step() => if !running { return None },
            }
        }
    };
    let reply = tokio::time::timeout(timeout, wait).await;
    session.shutdown();

    match reply {
        Ok(Some(data)) => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        Ok(None) => bail!("connection closed before {} replied", callback),
        Err(_) => bail!("no reply to {} within {}ms", callback, timeout.as_millis()),
    }
}

fn cache_dir(config: &ClientConfig) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &config.offline.cache_dir {
        return Ok(dir.clone());
    }
    dirs::cache_dir()
        .map(|d| d.join("applib"))
        .context("no cache directory; set offline.cache_dir")
}

async fn cache(config: &ClientConfig, action: CacheAction) -> anyhow::Result<()> {
    let base = config.base_url()?;
    let store = DirStore::new(cache_dir(config)?);
    let mut manager = OfflineCacheManager::new(base.clone(), &config.offline, HttpSource::default(), store);

    match action {
        CacheAction::Install => {
            let outcome = manager.install().await.context("offline install failed")?;
            println!("{outcome:?}");
        }
        CacheAction::Get { path } => {
            manager.resume().await?;
            let url = base.join(&path).with_context(|| format!("bad path {path}"))?;
            let served = manager.fetch(&url).await?;
            tracing::info!("{} {} via {:?}", served.response.status, url, served.origin);
            std::io::stdout().write_all(&served.response.body)?;
        }
        CacheAction::List => {
            use applib_client::CacheStore;
            for name in manager.store().generations().await? {
                let marker = if name == manager.cache_name() { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
    }
    Ok(())
}

fn prop(config: &ClientConfig, action: PropAction) -> anyhow::Result<()> {
    let mut props = open_props(config);
    match action {
        PropAction::Get { key } => println!("{}", props.get(&key)),
        PropAction::Set { key, value } => {
            props.set(&key, value)?;
            if props.path().is_none() {
                tracing::warn!("No props file; {} was not persisted", key);
            }
        }
        PropAction::List => {
            let all: serde_json::Map<String, Value> = props
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
    }
    Ok(())
}
