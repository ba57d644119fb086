use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lanchat_store::{Attachment, Message, MessageStore};

use crate::attachments::AttachmentStore;
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
    pub attachments: Arc<AttachmentStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_page))
        .route("/messages", get(list_messages))
        .route("/send", post(send_message))
        .route("/images/:name", get(serve_image))
        .route("/files/:name", get(serve_file))
        .route("/static/*path", get(serve_static))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct SendResponse {
    status: &'static str,
}

async fn list_messages(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.store.snapshot().await)
}

async fn send_message(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SendResponse>, ServerError> {
    let mut username: Option<String> = None;
    let mut body = String::new();
    let mut image: Option<Vec<u8>> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "username" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                username = Some(value);
            }
            "message" => {
                body = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
            }
            "image" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                if !data.is_empty() {
                    image = Some(data.to_vec());
                }
            }
            "file" => {
                let original = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {}", e)))?;
                if !data.is_empty() {
                    file = Some((original, data.to_vec()));
                }
            }
            // Anything else, including a client-supplied timestamp, is
            // ignored: the server stamps messages itself.
            _ => {}
        }
    }

    let username = username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing 'username' field".to_string()))?;

    if body.trim().is_empty() && image.is_none() && file.is_none() {
        return Err(ServerError::BadRequest(
            "Empty message with no attachment".to_string(),
        ));
    }

    // An attachment failure must never lose the message itself.
    let attachment = match build_attachment(&state.attachments, image, file).await {
        Ok(attachment) => attachment,
        Err(e) => {
            warn!(error = %e, "attachment rejected, recording message without it");
            None
        }
    };

    state.store.append(Message::new(username, body, attachment)).await;

    Ok(Json(SendResponse { status: "success" }))
}

/// At most one attachment per message; when the client manages to send both
/// an image and a file part, the image wins.
async fn build_attachment(
    attachments: &AttachmentStore,
    image: Option<Vec<u8>>,
    file: Option<(String, Vec<u8>)>,
) -> Result<Option<Attachment>, ServerError> {
    if let Some(payload) = image {
        return attachments.store_image(&payload).await.map(Some);
    }
    if let Some((original_name, bytes)) = file {
        return attachments.store_file(&original_name, &bytes).await.map(Some);
    }
    Ok(None)
}

async fn serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    let path = state.attachments.image_path(&name)?;
    stream_blob(&path, &name, None).await
}

async fn serve_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ServerError> {
    let path = state.attachments.file_path(&name)?;
    stream_blob(&path, &name, Some(&name)).await
}

async fn serve_static(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Result<Response, ServerError> {
    let mut path = state.config.static_dir.clone();
    for component in rest.split('/') {
        if component.is_empty()
            || component == "."
            || component.contains("..")
            || component.contains('\\')
        {
            return Err(ServerError::BadRequest(
                "Path traversal detected".to_string(),
            ));
        }
        path.push(component);
    }
    stream_blob(&path, &rest, None).await
}

async fn index_page(State(state): State<AppState>) -> Result<Response, ServerError> {
    let path = state.config.static_dir.join("index.html");
    stream_blob(&path, "index.html", None).await
}

/// Read a stored blob and stream it back with a guessed content type.
/// `download_name` adds a `Content-Disposition: attachment` header so the
/// browser saves instead of rendering.
async fn stream_blob(
    path: &FsPath,
    public_name: &str,
    download_name: Option<&str>,
) -> Result<Response, ServerError> {
    if !path.exists() {
        return Err(ServerError::NotFound(public_name.to_string()));
    }

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to read {}: {}", public_name, e)))?;

    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref());

    if let Some(name) = download_name {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        );
    }

    builder
        .body(Body::from(data))
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
