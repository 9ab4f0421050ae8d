use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::io::{Cursor, Read};
use tiny_http::{Request, Response};

use digit_cnn::{EpochStats, FitConfig, Model, ModelSpec, CompileConfig, TrainEvent, TrainReport, Variant, CLASS_NAMES};

use crate::state::{FlashMessage, Hyperparams, SharedState, TrainingStatus};
use crate::render::{html_escape, render_flash_html, render_page, Page};
use crate::util::form::{form_get, parse_form};

pub const MODEL_DIR: &str = "trained_models";

// ---------------------------------------------------------------------------
// GET /train
// ---------------------------------------------------------------------------

pub fn handle_get(state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let mut st = state.lock().unwrap();
    let flash      = st.take_flash();
    let is_running = st.is_training();
    let hp         = st.hyperparams.clone();
    let data_dir   = st.data_dir.clone();
    let history    = st.epoch_history.clone();

    let total_epochs = match &st.training {
        TrainingStatus::Running { total_epochs, .. } => *total_epochs,
        _ => hp.epochs,
    };
    let status_html = match &st.training {
        TrainingStatus::Idle => String::new(),
        TrainingStatus::Running { .. } => format!(
            r#"<div class="card" id="live"><h2>Training</h2>
<p>Epoch <span id="live-epoch">{done}</span> / {total}, batch <span id="live-batch">0</span> / <span id="live-batches">?</span></p>
<p>Batch loss <span id="live-loss">—</span>, batch accuracy <span id="live-acc">—</span></p></div>"#,
            done  = history.len(),
            total = total_epochs,
        ),
        TrainingStatus::Done { model_path, elapsed_total_ms } => build_done_html(
            model_path, *elapsed_total_ms, st.report.as_ref(),
        ),
        TrainingStatus::Failed { reason } => format!(
            "<div class=\"flash flash-error\">Training failed: {}</div>",
            html_escape(reason)
        ),
    };
    drop(st);

    let data_summary = match &data_dir {
        Some(dir) => format!("<p>MNIST loaded from <code>{}</code>.</p>", html_escape(dir)),
        None => "<p class=\"hint\">No dataset loaded yet.</p>".into(),
    };
    let model_summary = Model::compile(ModelSpec::digit_classifier(hp.variant), CompileConfig::default(), hp.seed)
        .map(|m| m.summary())
        .unwrap_or_default();

    let body = format!(
        r#"{flash}
<div class="card"><h2>Dataset</h2>{data_summary}
<form method="POST" action="/train/data">
  <input name="data_dir" value="{default_dir}"> <button class="btn" type="submit">Load MNIST</button>
</form></div>
<div class="card"><h2>Model</h2>
<form method="POST" action="/train/start">
  <label>Variant <select name="variant">
    <option value="basic"{basic_sel}>basic</option>
    <option value="regularized"{reg_sel}>regularized</option></select></label>
  <label>Epochs <input name="epochs" value="{epochs}" size="4"></label>
  <label>Batch size <input name="batch_size" value="{batch}" size="5"></label>
  <label>Seed <input name="seed" value="{seed}" size="6"></label>
  <label>Train samples <input name="train_limit" value="{train_limit}" size="7"></label>
  <label>Test samples <input name="test_limit" value="{test_limit}" size="7"></label>
  <button class="btn btn-primary" type="submit"{disabled}>Build &amp; train</button>
</form>
<pre>{summary}</pre></div>
{status}
{history}"#,
        flash        = render_flash_html(flash.as_ref()),
        data_summary = data_summary,
        default_dir  = html_escape(data_dir.as_deref().unwrap_or("data/mnist")),
        basic_sel    = if hp.variant == Variant::Basic { " selected" } else { "" },
        reg_sel      = if hp.variant == Variant::Regularized { " selected" } else { "" },
        epochs       = hp.epochs,
        batch        = hp.batch_size,
        seed         = hp.seed,
        train_limit  = hp.train_limit.map(|n| n.to_string()).unwrap_or_default(),
        test_limit   = hp.test_limit.map(|n| n.to_string()).unwrap_or_default(),
        disabled     = if is_running { " disabled" } else { "" },
        summary      = html_escape(&model_summary),
        status       = status_html,
        history      = build_history_table(&history),
    );

    crate::routes::html_response(render_page(Page::Train, is_running, |tmpl| {
        tmpl.replace("{{PAGE_BODY}}", &body)
    }))
}

/// Per-epoch table; rows are appended live by the page script.
fn build_history_table(history: &[EpochStats]) -> String {
    let rows: String = history.iter().map(epoch_row).collect();
    format!(
        r#"<div class="card"><h2>Epochs</h2><table class="summary-table" id="epochs">
<thead><tr><th>Epoch</th><th>Loss</th><th>Accuracy</th><th>Val loss</th><th>Val accuracy</th><th>Time</th></tr></thead>
<tbody>{}</tbody></table></div>"#,
        rows
    )
}

fn epoch_row(s: &EpochStats) -> String {
    format!(
        "<tr><td>{}/{}</td><td>{:.4}</td><td>{:.2}%</td><td>{}</td><td>{}</td><td>{:.1}s</td></tr>",
        s.epoch,
        s.total_epochs,
        s.loss,
        s.accuracy * 100.0,
        s.val_loss.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "—".into()),
        s.val_accuracy.map(|v| format!("{:.2}%", v * 100.0)).unwrap_or_else(|| "—".into()),
        s.elapsed_ms as f64 / 1000.0,
    )
}

fn build_done_html(model_path: &str, elapsed_total_ms: u64, report: Option<&TrainReport>) -> String {
    let file = std::path::Path::new(model_path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("model.json");
    let mut html = format!(
        r#"<div class="card"><h2>Done</h2>
<p>Trained in {:.1}s, saved to <code>{}</code>. <a href="/models/{}">Download topology</a></p>"#,
        elapsed_total_ms as f64 / 1000.0,
        html_escape(model_path),
        html_escape(file),
    );
    if let Some(r) = report {
        html.push_str(&format!(
            "<p>Test accuracy <b>{:.2}%</b>, test loss {:.4}</p>",
            r.test.accuracy * 100.0,
            r.test.loss
        ));
        html.push_str(&build_per_class_html(&r.per_class_accuracy));
        html.push_str(&build_confusion_matrix_html(&r.confusion));
    }
    html.push_str("</div>");
    html
}

fn build_per_class_html(per_class: &[Option<f64>]) -> String {
    let rows: String = per_class.iter().enumerate().map(|(digit, acc)| {
        format!(
            "<tr><th>{}</th><td>{}</td></tr>",
            CLASS_NAMES.get(digit).copied().unwrap_or("?"),
            acc.map(|a| format!("{:.2}%", a * 100.0)).unwrap_or_else(|| "—".into())
        )
    }).collect();
    format!(
        r#"<h3>Per-class accuracy</h3><table class="summary-table"><tbody>{}</tbody></table>"#,
        rows
    )
}

fn build_confusion_matrix_html(matrix: &[Vec<usize>]) -> String {
    let n = matrix.len();
    let max_off_diag = matrix.iter().enumerate()
        .flat_map(|(r, row)| row.iter().enumerate().filter(move |(c, _)| *c != r).map(|(_, &v)| v))
        .max()
        .unwrap_or(1)
        .max(1);

    let header: String = (0..n).map(|c| format!("<th>P:{}</th>", c)).collect();
    let rows: String = matrix.iter().enumerate().map(|(r, row)| {
        let cells: String = row.iter().enumerate().map(|(c, &v)| {
            if r == c {
                format!("<td class=\"conf-diag\">{}</td>", v)
            } else if v > 0 {
                let alpha = (v as f64 / max_off_diag as f64 * 0.4).min(0.4);
                format!("<td style=\"background:rgba(220,38,38,{:.2})\">{}</td>", alpha, v)
            } else {
                format!("<td>{}</td>", v)
            }
        }).collect();
        format!("<tr><th>T:{}</th>{}</tr>", r, cells)
    }).collect();

    format!(
        r#"<h3>Confusion matrix (test set)</h3>
<p class="hint">Rows = true digit, columns = predicted digit.</p>
<table class="conf-matrix"><thead><tr><th></th>{header}</tr></thead><tbody>{rows}</tbody></table>"#,
        header = header, rows = rows
    )
}

// ---------------------------------------------------------------------------
// POST /train/data
// ---------------------------------------------------------------------------

pub fn handle_load_data(request: &mut Request, state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);
    let pairs = parse_form(&body);
    let dir = form_get(&pairs, "data_dir").unwrap_or("data/mnist").trim().to_owned();

    let mut st = state.lock().unwrap();
    if st.is_training() {
        st.flash = Some(FlashMessage::error("A training run is in progress."));
        return crate::routes::redirect("/train");
    }
    // Failures leave the previous dataset in place.
    match st.session.load_data(&dir) {
        Ok(()) => {
            st.flash = Some(FlashMessage::success(format!("Loaded MNIST from {}", dir)));
            st.data_dir = Some(dir);
        }
        Err(e) => st.flash = Some(FlashMessage::error(e.to_string())),
    }
    drop(st);
    crate::routes::redirect("/train")
}

// ---------------------------------------------------------------------------
// POST /train/start
// ---------------------------------------------------------------------------

fn parse_hyperparams(pairs: &[(String, String)], current: &Hyperparams) -> Result<Hyperparams, String> {
    let number = |key: &str, fallback: usize| -> Result<usize, String> {
        match form_get(pairs, key).map(str::trim) {
            None | Some("") => Ok(fallback),
            Some(v) => v.parse().map_err(|_| format!("{} must be a whole number, got '{}'", key, v)),
        }
    };
    let limit = |key: &str| -> Result<Option<usize>, String> {
        match form_get(pairs, key).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| format!("{} must be a whole number, got '{}'", key, v)),
        }
    };
    let variant = match form_get(pairs, "variant") {
        Some("basic") => Variant::Basic,
        Some("regularized") => Variant::Regularized,
        _ => current.variant,
    };
    Ok(Hyperparams {
        variant,
        epochs: number("epochs", current.epochs)?,
        batch_size: number("batch_size", current.batch_size)?,
        seed: number("seed", current.seed as usize)? as u64,
        train_limit: limit("train_limit")?,
        test_limit: limit("test_limit")?,
    })
}

pub fn handle_start(request: &mut Request, state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);
    let pairs = parse_form(&body);

    let mut st = state.lock().unwrap();

    // If already running, don't start another.
    if st.is_training() {
        drop(st);
        return crate::routes::redirect("/train");
    }
    let hp = match parse_hyperparams(&pairs, &st.hyperparams) {
        Ok(hp) => hp,
        Err(msg) => {
            st.flash = Some(FlashMessage::error(msg));
            return crate::routes::redirect("/train");
        }
    };
    st.hyperparams = hp.clone();
    if st.session.data().is_none() {
        st.flash = Some(FlashMessage::error("Load the MNIST dataset before training."));
        return crate::routes::redirect("/train");
    }

    // The run owns the session; predictions meanwhile report "not ready".
    let mut session = std::mem::take(&mut st.session).with_limits(hp.train_limit, hp.test_limit);
    let model_name = match session.build_model(hp.variant, hp.seed) {
        Ok(model) => model.spec.name.clone(),
        Err(e) => {
            st.session = session;
            st.flash = Some(FlashMessage::error(e.to_string()));
            return crate::routes::redirect("/train");
        }
    };

    let (tx, rx) = mpsc::channel::<TrainEvent>();
    st.training = TrainingStatus::Running {
        event_rx:     Arc::new(Mutex::new(rx)),
        total_epochs: hp.epochs,
    };
    st.epoch_history.clear();
    st.report = None;
    drop(st);

    let fit_config = FitConfig {
        epochs: hp.epochs,
        batch_size: hp.batch_size,
        seed: hp.seed,
        ..FitConfig::regularized()
    }
    .with_progress(tx);

    // Spawn background training thread.
    let state_clone = state.clone();
    thread::spawn(move || {
        let t_start = std::time::Instant::now();
        let model_path = format!("{}/{}.json", MODEL_DIR, model_name);
        let result = session
            .train(&fit_config)
            .and_then(|report| session.save_model(&model_path).map(|_| report));
        // Closing the channel ends the SSE stream.
        drop(fit_config);
        let elapsed_total_ms = t_start.elapsed().as_millis() as u64;

        let mut st = state_clone.lock().unwrap();
        st.session = session;
        match result {
            Ok(report) => {
                log::info!("studio run finished, model saved to {}", model_path);
                // Covers runs nobody watched over SSE.
                st.epoch_history = report.history.epochs.clone();
                st.report = Some(report);
                st.training = TrainingStatus::Done { model_path, elapsed_total_ms };
            }
            Err(e) => {
                log::error!("studio run failed: {}", e);
                st.training = TrainingStatus::Failed { reason: e.to_string() };
            }
        }
    });

    crate::routes::redirect("/train")
}
