//! Binary entrypoint for the festival slideshow.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use festive_slideshow::config::Configuration;
use festive_slideshow::lister;
use festive_slideshow::lister::SlideshowResponse;
use festive_slideshow::preload::{DirectoryPreloader, HttpPreloader};
use festive_slideshow::source::{DirectoryImageSource, HttpImageSource};
use festive_slideshow::tasks::{slideshow::SlideshowOptions, terminal};
use festive_slideshow::web;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(
    name = "festival",
    version,
    about = "Festive landing page with a folder-backed image slideshow"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "festival.yaml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the landing page, the image list endpoint and the images.
    Serve {
        /// Override the configured bind address
        #[arg(long, value_name = "ADDR")]
        bind: Option<std::net::IpAddr>,
        /// Override the configured port
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Open a slideshow session in this terminal.
    Show {
        /// Base URL of a running `festival serve`
        #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:3000/")]
        server: Url,
        /// Read the slideshow folder directly instead of asking a server
        #[arg(long)]
        local: bool,
        /// Override the auto-advance interval (e.g. "5s")
        #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
    },
    /// Print the image list as served by the endpoint and exit.
    List,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(
            format!("festive_slideshow={level}")
                .parse()
                .context("invalid log directive")?,
        )
        .add_directive("hyper=warn".parse().context("invalid log directive")?);
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = Configuration::load_or_default(&cli.config)?
        .validated()
        .context("invalid configuration values")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            cancel.cancel();
        });
    }

    match cli.command {
        Commands::Serve { bind, port } => {
            let mut cfg = cfg;
            if let Some(bind) = bind {
                cfg.server.bind_address = bind;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            web::serve(cfg, cancel).await?;
        }
        Commands::Show {
            server,
            local,
            interval,
        } => {
            let mut options = SlideshowOptions::from(&cfg);
            if let Some(interval) = interval {
                options.advance_interval = interval;
            }
            let options = options.validated().context("invalid --interval")?;
            let reason = if local {
                terminal::run(
                    DirectoryImageSource::new(&cfg.slideshow_dir, cfg.url_prefix.clone()),
                    DirectoryPreloader::new(&cfg.slideshow_dir, cfg.url_prefix.clone()),
                    options,
                    cancel,
                )
                .await?
            } else {
                let client = reqwest::Client::new();
                terminal::run(
                    HttpImageSource::new(client.clone(), &server)?,
                    HttpPreloader::new(client, server),
                    options,
                    cancel,
                )
                .await?
            };
            info!(?reason, "slideshow session ended");
        }
        Commands::List => {
            let images = lister::list_images(&cfg.slideshow_dir, &cfg.url_prefix);
            let body = serde_json::to_string_pretty(&SlideshowResponse { images })?;
            println!("{body}");
        }
    }
    Ok(())
}
