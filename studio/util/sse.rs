use digit_cnn::TrainEvent;

// ---------------------------------------------------------------------------
// SSE framing helpers
// ---------------------------------------------------------------------------

/// Raw HTTP response head for an event stream; the body is written frame by
/// frame through `Request::into_writer`.
pub const SSE_RESPONSE_HEAD: &str = "HTTP/1.1 200 OK\r\n\
                                     Content-Type: text/event-stream\r\n\
                                     Cache-Control: no-cache\r\n\
                                     Connection: keep-alive\r\n\
                                     X-Accel-Buffering: no\r\n\
                                     \r\n";

/// Formats a named SSE event with a JSON data payload.
///
/// Output format (per SSE spec):
/// ```text
/// event: <name>\n
/// data: <json>\n
/// \n
/// ```
pub fn format_sse_event(event_name: &str, json_data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", event_name, json_data)
}

/// Keep-alive comment; ignored by EventSource clients.
pub const SSE_KEEPALIVE: &str = ": ping\n\n";

/// `batch` / `epoch` frame for one training event.
pub fn format_train_event(event: &TrainEvent) -> Option<String> {
    let json = serde_json::to_string(event).ok()?;
    let name = match event {
        TrainEvent::BatchEnd { .. } => "batch",
        TrainEvent::EpochEnd(_)     => "epoch",
    };
    Some(format_sse_event(name, &json))
}
