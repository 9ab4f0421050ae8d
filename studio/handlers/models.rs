use std::io::Cursor;
use tiny_http::Response;

use crate::handlers::train::MODEL_DIR;

/// `GET /models/{file}`
///
/// Serves a saved topology (`name.json`) or weights file
/// (`name.weights.bin`) as a downloadable attachment.
pub fn handle_download(file: &str) -> Response<Cursor<Vec<u8>>> {
    // Reject empty names or path traversal attempts.
    if file.is_empty() || file.contains('/') || file.contains('\\') || file.contains("..") {
        return crate::routes::not_found();
    }
    let content_type = if file.ends_with(".weights.bin") {
        "application/octet-stream"
    } else if file.ends_with(".json") {
        "application/json"
    } else {
        return crate::routes::not_found();
    };

    match std::fs::read(format!("{}/{}", MODEL_DIR, file)) {
        Ok(bytes) => crate::routes::download_response(bytes, content_type, file),
        Err(_) => crate::routes::not_found(),
    }
}
