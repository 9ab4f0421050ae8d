use std::io::Write;
use std::time::Duration;
use tiny_http::Request;

use digit_cnn::TrainEvent;

use crate::state::{SharedState, TrainingStatus};
use crate::util::sse::{format_sse_event, format_train_event, SSE_KEEPALIVE, SSE_RESPONSE_HEAD};

/// `GET /train/events`: Server-Sent Events handler.
///
/// This handler consumes `request` (takes ownership so we can call
/// `into_writer`) and drives a long-lived loop that:
/// 1. Replays the epochs already finished.
/// 2. Receives `TrainEvent`s from the training channel with a 500 ms timeout
///    and writes each as a `batch` or `epoch` frame.
/// 3. On timeout: writes a keep-alive comment.
/// 4. On channel disconnect (training finished): writes a `done` or
///    `failed` event, then closes.
pub fn handle(request: Request, state: SharedState) {
    let mut writer = request.into_writer();
    if write_all(&mut writer, SSE_RESPONSE_HEAD.as_bytes()).is_err() {
        return;
    }

    // Clone the receiver Arc out so we don't hold the lock while streaming.
    let (event_rx, replay) = {
        let st = state.lock().unwrap();
        let rx = match &st.training {
            TrainingStatus::Running { event_rx, .. } => Some(event_rx.clone()),
            _ => None,
        };
        (rx, st.epoch_history.clone())
    };

    for stats in replay {
        if let Some(frame) = format_train_event(&TrainEvent::EpochEnd(stats)) {
            if write_all(&mut writer, frame.as_bytes()).is_err() { return; }
        }
    }

    let rx_arc = match event_rx {
        Some(r) => r,
        None    => {
            let _ = write_all(&mut writer, format_sse_event("done", "{}").as_bytes());
            return;
        }
    };

    loop {
        let result = {
            let rx = rx_arc.lock().unwrap();
            rx.recv_timeout(Duration::from_millis(500))
        };

        match result {
            Ok(event) => {
                if let TrainEvent::EpochEnd(stats) = &event {
                    state.lock().unwrap().epoch_history.push(stats.clone());
                }
                if let Some(frame) = format_train_event(&event) {
                    if write_all(&mut writer, frame.as_bytes()).is_err() { return; }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if write_all(&mut writer, SSE_KEEPALIVE.as_bytes()).is_err() { return; }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                // The training thread may still be saving; wait for its verdict.
                let frame = loop {
                    let st = state.lock().unwrap();
                    match &st.training {
                        TrainingStatus::Running { .. } => {}
                        TrainingStatus::Done { model_path, elapsed_total_ms } => {
                            let json = serde_json::json!({
                                "model_path": model_path,
                                "elapsed_total_ms": elapsed_total_ms,
                                "test_accuracy": st.report.as_ref().map(|r| r.test.accuracy),
                            });
                            break format_sse_event("done", &json.to_string());
                        }
                        TrainingStatus::Failed { reason } => {
                            let json = serde_json::json!({ "reason": reason });
                            break format_sse_event("failed", &json.to_string());
                        }
                        TrainingStatus::Idle => break format_sse_event("done", "{}"),
                    }
                    drop(st);
                    std::thread::sleep(Duration::from_millis(100));
                };
                let _ = write_all(&mut writer, frame.as_bytes());
                return;
            }
        }
    }
}

/// Writes all bytes to the writer, returning `Err` on any I/O failure.
fn write_all<W: Write + ?Sized>(w: &mut W, data: &[u8]) -> std::io::Result<()> {
    w.write_all(data)?;
    w.flush()
}
