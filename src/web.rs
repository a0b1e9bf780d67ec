use std::path::Path as FsPath;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Configuration;
use crate::lister::{self, ImageList, SlideshowResponse};
use crate::source::SLIDESHOW_ENDPOINT;

#[derive(Clone)]
struct AppState {
    config: Arc<Configuration>,
}

pub fn router(config: Configuration) -> Router {
    let images_route = format!("{}/{{file}}", config.url_prefix.trim_end_matches('/'));
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route("/", get(landing_page))
        .route(SLIDESHOW_ENDPOINT, get(slideshow_images))
        .route(&images_route, get(serve_image))
        .with_state(state)
}

pub async fn serve(config: Configuration, cancel: CancellationToken) -> Result<()> {
    let addr = config.server.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind slideshow listener on {addr}"))?;
    info!(?addr, dir = %config.slideshow_dir.display(), "slideshow server listening");

    axum::serve(listener, router(config).into_make_service())
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .context("slideshow server exited")?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            term.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received; shutting down"),
        _ = terminate => info!("SIGTERM received; shutting down"),
        _ = cancel.cancelled() => {},
    }
}

async fn slideshow_images(State(state): State<AppState>) -> Json<SlideshowResponse> {
    let config = Arc::clone(&state.config);
    let images = tokio::task::spawn_blocking(move || {
        lister::list_images(&config.slideshow_dir, &config.url_prefix)
    })
    .await
    .unwrap_or_else(|err| {
        error!(error = %err, "image listing task failed");
        ImageList::empty()
    });
    Json(SlideshowResponse { images })
}

async fn serve_image(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    if !is_servable_name(&file) {
        debug!(file = %file, "refusing to serve file");
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.config.slideshow_dir.join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type_for(&path))],
            bytes,
        )
            .into_response(),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "image not readable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// A bare allow-listed file name: no separators, no hidden files.
fn is_servable_name(name: &str) -> bool {
    !name.is_empty()
        && !lister::is_hidden(name)
        && !name.contains(['/', '\\'])
        && lister::is_image(FsPath::new(name))
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(render_landing_page(&state.config))
}

fn render_landing_page(config: &Configuration) -> String {
    format!(
        "<!doctype html><html lang='en'><head><meta charset='utf-8'><meta name='viewport' content='width=device-width,initial-scale=1'>\
<title>{title}</title><style>{styles}</style></head><body><main><h1>{title}</h1><p><a href='{endpoint}'>Slideshow images</a></p></main>\
<footer><iframe src='https://open.spotify.com/embed/playlist/{playlist}?utm_source=generator&amp;theme=0' width='100%' height='80' frameborder='0' \
allow='autoplay; clipboard-write; encrypted-media; fullscreen; picture-in-picture' loading='lazy'></iframe></footer></body></html>",
        title = escape_html(&config.title),
        styles = styles(),
        endpoint = SLIDESHOW_ENDPOINT,
        playlist = config.music_playlist_id,
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn styles() -> &'static str {
    "body{margin:0;min-height:100vh;background:#000;color:#fff;font-family:Georgia,serif;}main{display:flex;flex-direction:column;align-items:center;justify-content:center;height:85vh;text-align:center;}h1{font-size:5rem;letter-spacing:0.1em;text-transform:uppercase;}a{color:#bfdbfe;}footer{position:fixed;bottom:0;left:0;width:100%;background:rgba(0,0,0,0.6);padding:0.5rem 0;}"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bare_image_names_are_servable() {
        assert!(is_servable_name("A.jpg"));
        assert!(is_servable_name("tree.SVG"));
        assert!(!is_servable_name("../config.yaml"));
        assert!(!is_servable_name("..\\x.png"));
        assert!(!is_servable_name(".hidden.png"));
        assert!(!is_servable_name("notes.txt"));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for(FsPath::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(FsPath::new("a.svg")), "image/svg+xml");
        assert_eq!(content_type_for(FsPath::new("a.webp")), "image/webp");
    }

    #[test]
    fn landing_page_embeds_configured_playlist() {
        let cfg = Configuration {
            title: "Snow & Lights".into(),
            music_playlist_id: "abc123".into(),
            ..Configuration::default()
        };
        let html = render_landing_page(&cfg);
        assert!(html.contains("https://open.spotify.com/embed/playlist/abc123?"));
        assert!(html.contains("<h1>Snow &amp; Lights</h1>"));
    }
}
