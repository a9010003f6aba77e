//! Presentation surface server.
//!
//! A single route carries everything: a plain GET on `/` serves the preview
//! page, a WebSocket upgrade on the same path becomes the message channel
//! the page and the pipeline talk over. `/doc/*path` serves files from the
//! open document's directory so relative asset references resolve.

use crate::assets;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path as UrlPath};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use pandoc_preview_core::{
    ControllerHandle, ControllerMsg, ScrollFeedback, SurfaceHandle, SurfaceMessage, UiSignal,
};
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Latest surface state, replayed to every freshly connected page.
#[derive(Default)]
struct Replay {
    content: Option<SurfaceMessage>,
    status: Option<SurfaceMessage>,
    recent: Option<SurfaceMessage>,
}

#[derive(Clone)]
struct ServerContext {
    surface: SurfaceHandle,
    msg_tx: mpsc::UnboundedSender<ControllerMsg>,
    served_root: Arc<RwLock<Option<PathBuf>>>,
    replay: Arc<RwLock<Replay>>,
}

/// Run the preview server until the listener fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    handle: ControllerHandle,
) -> std::io::Result<()> {
    let replay = Arc::new(RwLock::new(Replay {
        content: None,
        status: None,
        recent: Some(SurfaceMessage::RecentFiles {
            files: handle.initial_recent.clone(),
        }),
    }));

    // Keep the replay state current so late-connecting pages catch up.
    let mut cache_rx = handle.surface.subscribe();
    let cache = Arc::clone(&replay);
    tokio::spawn(async move {
        loop {
            match cache_rx.recv().await {
                Ok(msg) => {
                    let mut replay = cache.write().await;
                    match &msg {
                        SurfaceMessage::SetContent { .. } => replay.content = Some(msg),
                        SurfaceMessage::Status { .. } => replay.status = Some(msg),
                        SurfaceMessage::RecentFiles { .. } => replay.recent = Some(msg),
                        _ => {}
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let ctx = ServerContext {
        surface: handle.surface,
        msg_tx: handle.msg_tx,
        served_root: handle.served_root,
        replay,
    };

    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/doc/*path", get(serve_doc))
        .layer(Extension(ctx));

    axum::serve(listener, app).await
}

/// Serves the page on a plain GET, upgrades to the message channel when the
/// request negotiates a WebSocket.
async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    Extension(ctx): Extension<ServerContext>,
) -> impl IntoResponse {
    if let Some(ws) = ws {
        ws.on_upgrade(move |socket| handle_socket(socket, ctx))
    } else {
        (StatusCode::OK, Html(assets::page())).into_response()
    }
}

async fn handle_socket(mut socket: WebSocket, ctx: ServerContext) {
    let mut rx = ctx.surface.subscribe();

    // Bring the page up to date before streaming live messages.
    let catchup: Vec<SurfaceMessage> = {
        let replay = ctx.replay.read().await;
        [&replay.recent, &replay.status, &replay.content]
            .into_iter()
            .filter_map(|m| m.clone())
            .collect()
    };
    for msg in catchup {
        if send_json(&mut socket, &msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Ok(msg) => {
                    if send_json(&mut socket, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "page fell behind the surface channel");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<UiSignal>(&text) {
                    Ok(signal) => forward(signal, &ctx),
                    Err(e) => tracing::warn!(error = %e, "unparseable page signal"),
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket error");
                    break;
                }
            },
        }
    }

    let _ = socket.send(WsMessage::Close(None)).await;
}

async fn send_json(socket: &mut WebSocket, msg: &SurfaceMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(text) => socket.send(WsMessage::Text(text)).await,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize surface message");
            Ok(())
        }
    }
}

/// Map a page signal onto a controller message.
fn forward(signal: UiSignal, ctx: &ServerContext) {
    let msg = match signal {
        UiSignal::Open { path } => ControllerMsg::Open(PathBuf::from(path)),
        UiSignal::Drop { name, mime } => ControllerMsg::Drop { name, mime },
        UiSignal::Export { path } => ControllerMsg::Export(path.map(PathBuf::from)),
        UiSignal::Reload => ControllerMsg::Reload,
        UiSignal::Scroll {
            scroll_y,
            content_height,
            viewport_area,
        } => ControllerMsg::Scroll(ScrollFeedback {
            scroll_y,
            content_height,
            viewport_area,
        }),
        UiSignal::StickToEnd { enabled } => ControllerMsg::StickToEnd(enabled),
        UiSignal::Resized { viewport_area } => ControllerMsg::Resized { viewport_area },
    };
    let _ = ctx.msg_tx.send(msg);
}

/// Serve a file from the open document's directory.
async fn serve_doc(
    UrlPath(path): UrlPath<String>,
    Extension(ctx): Extension<ServerContext>,
) -> impl IntoResponse {
    let relative = PathBuf::from(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(root) = ctx.served_root.read().await.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let full = root.join(&relative);

    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let mime = pandoc_preview_core::document::mime_name(&full);
            ([(header::CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
