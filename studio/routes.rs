use std::io::Cursor;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::state::SharedState;
use crate::handlers;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn header(name: &str, value: &str) -> Header {
    // Names and values are ASCII literals or sanitized file names.
    Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}

fn bytes_response(status: u16, content_type: &str, bytes: Vec<u8>) -> Response<Cursor<Vec<u8>>> {
    let len = bytes.len();
    Response::new(
        StatusCode(status),
        vec![header("Content-Type", content_type)],
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

pub fn html_response(body: String) -> Response<Cursor<Vec<u8>>> {
    bytes_response(200, "text/html; charset=utf-8", body.into_bytes())
}

pub fn json_response(status: u16, body: String) -> Response<Cursor<Vec<u8>>> {
    bytes_response(status, "application/json", body.into_bytes())
}

pub fn redirect(location: &str) -> Response<Cursor<Vec<u8>>> {
    Response::new(
        StatusCode(303),
        vec![header("Location", location), header("Content-Length", "0")],
        Cursor::new(Vec::new()),
        Some(0),
        None,
    )
}

pub fn download_response(bytes: Vec<u8>, content_type: &str, filename: &str) -> Response<Cursor<Vec<u8>>> {
    let disposition = format!("attachment; filename=\"{}\"", filename);
    bytes_response(200, content_type, bytes)
        .with_header(header("Content-Disposition", &disposition))
}

pub fn not_found() -> Response<Cursor<Vec<u8>>> {
    bytes_response(404, "text/plain", b"404 Not Found".to_vec())
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches incoming requests to the appropriate handler.
///
/// All handlers (except SSE) receive a `&mut Request` so that the dispatcher
/// retains ownership and can call `request.respond(response)` at the end.
/// The SSE handler takes ownership to perform long-lived streaming.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url    = request.url().to_owned();

    let (path, query) = match url.find('?') {
        Some(pos) => (url[..pos].to_owned(), url[pos + 1..].to_owned()),
        None      => (url.clone(), String::new()),
    };
    log::debug!("{} {}", method, path);

    // SSE: long-lived; handler takes ownership and drives the stream loop.
    if method == Method::Get && path == "/train/events" {
        handlers::train_sse::handle(request, state);
        return;
    }

    // Model download: dynamic path segment.
    if method == Method::Get && path.starts_with("/models/") {
        let file = path.strip_prefix("/models/").unwrap_or("").to_owned();
        let _ = request.respond(handlers::models::handle_download(&file));
        return;
    }

    let response = match (method, path.as_str()) {
        (Method::Get, "/") => redirect("/train"),

        // ── Train ────────────────────────────────────────────────────────
        (Method::Get,  "/train")        => handlers::train::handle_get(state),
        (Method::Post, "/train/data")   => handlers::train::handle_load_data(&mut request, state),
        (Method::Post, "/train/start")  => handlers::train::handle_start(&mut request, state),

        // ── Draw ─────────────────────────────────────────────────────────
        (Method::Get,  "/draw")             => handlers::draw::handle_get(state),
        (Method::Post, "/draw/predict")     => handlers::draw::handle_predict(&mut request, &query, state),
        (Method::Post, "/draw/load-model")  => handlers::draw::handle_load_model(&mut request, state),

        _ => not_found(),
    };

    let _ = request.respond(response);
}
