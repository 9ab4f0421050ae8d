/// Central template renderer for the studio.
///
/// The studio uses a single HTML template (`studio/assets/studio.html`) with
/// placeholder tokens like `{{TOKEN}}`. Global tokens (active tab, training
/// flag) are resolved here; the caller's closure fills the page body.
/// Tokens nobody filled are blanked so raw `{{TOKEN}}` strings never reach
/// the browser.

use crate::state::{FlashKind, FlashMessage};

const TEMPLATE: &str = include_str!("assets/studio.html");

/// Which tab is active: controls both the active CSS class and the JS
/// `ACTIVE_TAB` variable injected into the page.
#[derive(Clone, Copy)]
pub enum Page {
    Train = 0,
    Draw  = 1,
}

pub fn render_page<F>(page: Page, training_running: bool, fill: F) -> String
where
    F: FnOnce(String) -> String,
{
    let mut html = TEMPLATE.to_owned();

    html = html.replace("{{ACTIVE_TAB}}",       &(page as u8).to_string());
    html = html.replace("{{TRAINING_RUNNING}}", if training_running { "true" } else { "false" });
    html = html.replace("{{TAB_TRAIN_CLASS}}",  if matches!(page, Page::Train) { "tab active" } else { "tab" });
    html = html.replace("{{TAB_DRAW_CLASS}}",   if matches!(page, Page::Draw) { "tab active" } else { "tab" });

    html = fill(html);

    blank_remaining(html)
}

fn blank_remaining(mut html: String) -> String {
    while let Some(start) = html.find("{{") {
        if let Some(end) = html[start..].find("}}") {
            let abs_end = start + end + 2;
            html.replace_range(start..abs_end, "");
        } else {
            break;
        }
    }
    html
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_flash_html(flash: Option<&FlashMessage>) -> String {
    match flash {
        Some(f) => {
            let class = match f.kind {
                FlashKind::Success => "flash flash-success",
                FlashKind::Error   => "flash flash-error",
            };
            format!("<div class=\"{}\">{}</div>", class, html_escape(&f.text))
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfilled_tokens_are_blanked() {
        let html = render_page(Page::Draw, false, |t| t.replace("{{PAGE_BODY}}", "<p>x</p>"));
        assert!(!html.contains("{{"));
        assert!(html.contains("<p>x</p>"));
    }

    #[test]
    fn escape_covers_markup() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
