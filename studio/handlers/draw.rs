use std::io::{Cursor, Read};
use tiny_http::{Request, Response};

use digit_cnn::RawImage;

use crate::handlers::train::MODEL_DIR;
use crate::state::{FlashMessage, SharedState};
use crate::util::form::{form_get, parse_form};
use crate::util::image::image_bytes_to_raw;
use crate::render::{html_escape, render_flash_html, render_page, Page};

// ---------------------------------------------------------------------------
// GET /draw
// ---------------------------------------------------------------------------

pub fn handle_get(state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let mut st = state.lock().unwrap();
    let flash      = st.take_flash();
    let is_running = st.is_training();
    let model_line = match st.session.model() {
        Some(m) => format!("Active model: <code>{}</code>", html_escape(&m.spec.name)),
        None if is_running => "The model is training; drawing is available once it finishes.".into(),
        None => "No model yet. Train one or load a saved model below.".into(),
    };
    drop(st);

    let body = format!(
        r#"{flash}
<div class="card"><h2>Draw a digit</h2>
<p class="hint">{model_line}</p>
<div class="draw-row">
  <canvas id="canvas" width="280" height="280"></canvas>
  <div id="prediction"><p class="hint">Draw white on black; every stroke runs one prediction.</p></div>
</div>
<button class="btn" type="button" id="clear">Clear</button>
<label class="btn">Classify a file <input type="file" id="upload" accept="image/*" hidden></label>
</div>
<div class="card"><h2>Saved models</h2>
<form method="POST" action="/draw/load-model">
  <select name="model">{options}</select>
  <button class="btn" type="submit">Load</button>
</form></div>"#,
        flash      = render_flash_html(flash.as_ref()),
        model_line = model_line,
        options    = build_model_options(&list_models()),
    );

    crate::routes::html_response(render_page(Page::Draw, is_running, |tmpl| {
        tmpl.replace("{{PAGE_BODY}}", &body)
    }))
}

fn list_models() -> Vec<String> {
    match std::fs::read_dir(MODEL_DIR) {
        Ok(entries) => {
            let mut names: Vec<String> = entries.flatten()
                .filter_map(|e| {
                    let path = e.path();
                    if path.extension().and_then(|s| s.to_str()) == Some("json") {
                        path.file_stem().and_then(|s| s.to_str()).map(|s| s.to_owned())
                    } else {
                        None
                    }
                })
                .collect();
            names.sort();
            names
        }
        Err(_) => vec![],
    }
}

fn build_model_options(models: &[String]) -> String {
    if models.is_empty() {
        return format!("<option disabled>No models found in {}/</option>", MODEL_DIR);
    }
    models.iter()
        .map(|name| format!("<option value=\"{0}\">{0}</option>", html_escape(name)))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// POST /draw/predict?w=W&h=H   (raw RGBA body)
// POST /draw/predict           (encoded image file body)
// ---------------------------------------------------------------------------

fn decode_body(query: &str, body: Vec<u8>) -> Result<RawImage, String> {
    let pairs = parse_form(query);
    let dim = |key: &str| form_get(&pairs, key).and_then(|v| v.parse::<usize>().ok());
    match (dim("w"), dim("h")) {
        (Some(w), Some(h)) => RawImage::from_rgba(w, h, body).map_err(|e| e.to_string()),
        _ => image_bytes_to_raw(&body),
    }
}

pub fn handle_predict(request: &mut Request, query: &str, state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let mut body = Vec::new();
    if request.as_reader().read_to_end(&mut body).is_err() {
        return error_json(400, "could not read request body");
    }
    let image = match decode_body(query, body) {
        Ok(img) => img,
        Err(e)  => return error_json(400, &e),
    };

    let st = state.lock().unwrap();
    let result = st.session.predict(&image);
    drop(st);

    match result {
        Ok(prediction) => match serde_json::to_string(&prediction) {
            Ok(json) => crate::routes::json_response(200, json),
            Err(e)   => error_json(500, &e.to_string()),
        },
        Err(e) => {
            log::warn!("prediction failed: {}", e);
            error_json(409, &e.to_string())
        }
    }
}

fn error_json(status: u16, message: &str) -> Response<Cursor<Vec<u8>>> {
    let body = serde_json::json!({ "error": message }).to_string();
    crate::routes::json_response(status, body)
}

// ---------------------------------------------------------------------------
// POST /draw/load-model
// ---------------------------------------------------------------------------

pub fn handle_load_model(request: &mut Request, state: SharedState) -> Response<Cursor<Vec<u8>>> {
    let mut body = String::new();
    let _ = request.as_reader().read_to_string(&mut body);
    let pairs = parse_form(&body);
    let name  = form_get(&pairs, "model").unwrap_or("").to_owned();

    let mut st = state.lock().unwrap();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        st.flash = Some(FlashMessage::error("Pick a saved model."));
    } else if st.is_training() {
        st.flash = Some(FlashMessage::error("A training run is in progress."));
    } else {
        let path = format!("{}/{}.json", MODEL_DIR, name);
        // Validate the digit shape before replacing the active model.
        match digit_cnn::Classifier::load(&path) {
            Ok(classifier) => {
                st.session.set_model(classifier.model().clone());
                st.flash = Some(FlashMessage::success(format!("Loaded {}", name)));
            }
            Err(e) => st.flash = Some(FlashMessage::error(e.to_string())),
        }
    }
    drop(st);
    crate::routes::redirect("/draw")
}
