//! Live preview document composition
//!
//! Produces one self-contained HTML document from the markup, stylesheet
//! and script files of the project.

use super::model::{FileModel, VirtualFile};

/// Shown when the project has no markup file
pub const PLACEHOLDER_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>Preview</title></head>
<body style="font-family: sans-serif; color: #888; display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0;">
  <p>No HTML file to preview yet.</p>
</body>
</html>
"#;

fn pick<'a>(model: &'a FileModel, preferred: &str, extension: &str) -> Option<&'a VirtualFile> {
    model.get(preferred).or_else(|| {
        model
            .iter()
            .find(|f| f.path.to_ascii_lowercase().ends_with(extension))
    })
}

/// Insert `fragment` before the last case-insensitive occurrence of
/// `closing_tag`, or append it when the tag is missing
fn insert_before(document: &mut String, closing_tag: &str, fragment: &str) {
    let lower = document.to_ascii_lowercase();
    match lower.rfind(closing_tag) {
        Some(idx) => document.insert_str(idx, fragment),
        None => document.push_str(fragment),
    }
}

/// Compose the preview document for `model`
pub fn compose_preview(model: &FileModel) -> String {
    let Some(markup) = pick(model, "index.html", ".html").or_else(|| pick(model, "index.htm", ".htm")) else {
        return PLACEHOLDER_DOCUMENT.to_string();
    };

    let mut document = markup.content.clone();

    if let Some(style) = pick(model, "style.css", ".css") {
        let fragment = format!("<style>\n{}\n</style>\n", style.content);
        insert_before(&mut document, "</head>", &fragment);
    }

    if let Some(script) = pick(model, "script.js", ".js") {
        let fragment = format!("<script>\n{}\n</script>\n", script.content);
        insert_before(&mut document, "</body>", &fragment);
    }

    document
}
