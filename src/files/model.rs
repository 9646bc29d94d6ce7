use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Markup every new session starts with
pub const BOOTSTRAP_MARKUP: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Voiceflow</title>
</head>
<body>
  <h1>Say "voice flow" and describe what to build.</h1>
</body>
</html>
"#;

/// One file in the virtual project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFile {
    pub path: String,
    pub content: String,
    pub language: String,
}

impl VirtualFile {
    /// Create a file, inferring the language from the extension when absent
    pub fn new(path: impl Into<String>, content: impl Into<String>, language: Option<&str>) -> Self {
        let path = path.into();
        let language = match language.map(str::trim) {
            Some(lang) if !lang.is_empty() => lang.to_string(),
            _ => language_for_path(&path).to_string(),
        };
        Self {
            path,
            content: content.into(),
            language,
        }
    }
}

/// Content and language of a file as sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub content: String,
    pub language: String,
}

/// Path-keyed set of virtual files
///
/// Paths are unique. Iteration is sorted by path so the UI gets a stable
/// order for free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileModel {
    files: BTreeMap<String, VirtualFile>,
}

impl FileModel {
    /// Empty model, mostly for tests
    pub fn new() -> Self {
        Self::default()
    }

    /// Model holding only the bootstrap markup file
    pub fn with_bootstrap(path: &str) -> Self {
        let mut model = Self::new();
        model.upsert(VirtualFile::new(path, BOOTSTRAP_MARKUP, None));
        model
    }

    /// Insert or overwrite the file at `file.path`; returns true if it existed
    pub fn upsert(&mut self, file: VirtualFile) -> bool {
        self.files.insert(file.path.clone(), file).is_some()
    }

    /// Remove a path; removing an absent path is a no-op
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualFile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path to file content/language map for the backend request
    pub fn snapshot(&self) -> BTreeMap<String, FileSnapshot> {
        self.files
            .iter()
            .map(|(path, file)| {
                (
                    path.clone(),
                    FileSnapshot {
                        content: file.content.clone(),
                        language: file.language.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Infer an editor language from the file extension
pub fn language_for_path(path: &str) -> &'static str {
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "html",
        Some("css") => "css",
        Some("js") | Some("mjs") | Some("cjs") | Some("jsx") => "javascript",
        Some("ts") | Some("tsx") => "typescript",
        Some("json") => "json",
        Some("md") | Some("markdown") => "markdown",
        Some("py") => "python",
        Some("rs") => "rust",
        Some("svg") | Some("xml") => "xml",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_inference() {
        assert_eq!(language_for_path("index.html"), "html");
        assert_eq!(language_for_path("styles/Main.CSS"), "css");
        assert_eq!(language_for_path("src/app.js"), "javascript");
        assert_eq!(language_for_path("notes.md"), "markdown");
        assert_eq!(language_for_path("Makefile"), "plaintext");
        assert_eq!(language_for_path("dir.v2/README"), "plaintext");
    }

    #[test]
    fn test_explicit_language_wins() {
        let file = VirtualFile::new("widget.txt", "", Some("javascript"));
        assert_eq!(file.language, "javascript");
        let blank = VirtualFile::new("widget.css", "", Some("  "));
        assert_eq!(blank.language, "css");
    }

    #[test]
    fn test_bootstrap_model() {
        let model = FileModel::with_bootstrap("index.html");
        assert_eq!(model.len(), 1);
        let file = model.get("index.html").unwrap();
        assert_eq!(file.language, "html");
        assert!(file.content.contains("<body>"));
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let mut model = FileModel::new();
        assert!(!model.upsert(VirtualFile::new("a.js", "1", None)));
        assert!(model.upsert(VirtualFile::new("a.js", "2", None)));
        assert_eq!(model.len(), 1);
        assert_eq!(model.get("a.js").unwrap().content, "2");
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut model = FileModel::with_bootstrap("index.html");
        assert!(!model.remove("missing.css"));
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_paths_are_sorted() {
        let mut model = FileModel::new();
        model.upsert(VirtualFile::new("z.css", "", None));
        model.upsert(VirtualFile::new("a.html", "", None));
        let paths: Vec<&str> = model.paths().collect();
        assert_eq!(paths, vec!["a.html", "z.css"]);
        assert_eq!(model.snapshot().len(), 2);
    }
}
