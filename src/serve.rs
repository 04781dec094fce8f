//! # Result-Directory Viewer
//!
//! The `serve` subcommand: a minimal HTTP server exposing a `--store-dir`
//! result tree for interactive viewing — `history.json`, `journal.json`,
//! `results.json`, the per-node logs, and the plotted artifacts. There is no
//! dynamic content; every request resolves straight to a file under the
//! store directory, so this is a one-shot static file server rather than a
//! framework, kept in the same bare `tokio::net::TcpListener` style the rest
//! of this codebase uses for its transports rather than pulling in an HTTP
//! framework for a handful of GETs.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Runs until the process is killed; each connection is handled on its own
/// task so a slow client (or a browser holding a keep-alive socket open)
/// never blocks the others.
pub async fn serve(store_dir: PathBuf, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, store_dir = %store_dir.display(), "serving result store");

    loop {
        let (stream, peer) = listener.accept().await.context("accepting connection")?;
        let store_dir = store_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &store_dir).await {
                warn!(%peer, error = %e, "error serving request");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, store_dir: &Path) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("reading request")?;
    if n == 0 {
        return Ok(());
    }
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let response = build_response(store_dir, path).await;
    stream.write_all(&response).await.context("writing response")?;
    stream.flush().await.ok();
    Ok(())
}

async fn build_response(store_dir: &Path, request_path: &str) -> Vec<u8> {
    match resolve(store_dir, request_path) {
        Some(fs_path) => match tokio::fs::read(&fs_path).await {
            Ok(body) => {
                let content_type = content_type_for(&fs_path);
                let mut head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                )
                .into_bytes();
                head.extend_from_slice(&body);
                head
            }
            Err(_) => not_found(),
        },
        None => bad_request(),
    }
}

/// Maps a request path onto a file under `store_dir`, rejecting anything
/// that escapes it via `..` or an absolute component — the only untrusted
/// input this server accepts is the request line itself.
fn resolve(store_dir: &Path, request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.split('?').next().unwrap_or("").trim_start_matches('/');
    let relative = if trimmed.is_empty() { "index.html" } else { trimmed };
    let relative_path = Path::new(relative);

    if relative_path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return None;
    }

    Some(store_dir.join(relative_path))
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("html") => "text/html; charset=utf-8",
        Some("log") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn not_found() -> Vec<u8> {
    let body = b"404 not found";
    format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes()
    .into_iter()
    .chain(body.iter().copied())
    .collect()
}

fn bad_request() -> Vec<u8> {
    let body = b"400 bad request";
    format!(
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes()
    .into_iter()
    .chain(body.iter().copied())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_parent_dir_escapes() {
        let store = PathBuf::from("/tmp/store");
        assert!(resolve(&store, "/../etc/passwd").is_none());
        assert!(resolve(&store, "/echo/latest/history.json").is_some());
    }

    #[test]
    fn resolve_defaults_empty_path_to_index() {
        let store = PathBuf::from("/tmp/store");
        assert_eq!(resolve(&store, "/").unwrap(), store.join("index.html"));
    }

    #[test]
    fn content_type_matches_persisted_artifacts() {
        assert_eq!(content_type_for(Path::new("results.json")), "application/json");
        assert_eq!(content_type_for(Path::new("messages.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("latency-raw.png")), "image/png");
    }
}
