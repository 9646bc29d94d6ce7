//! Edit operations returned by the backend and their application

use super::model::{FileModel, VirtualFile};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Create,
    Edit,
    Delete,
}

impl std::fmt::Display for EditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditAction::Create => write!(f, "create"),
            EditAction::Edit => write!(f, "edit"),
            EditAction::Delete => write!(f, "delete"),
        }
    }
}

/// One change to the virtual file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOperation {
    pub action: EditAction,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub summary: String,
}

impl EditOperation {
    pub fn create(path: impl Into<String>, content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            action: EditAction::Create,
            path: path.into(),
            content: Some(content.into()),
            language: None,
            summary: summary.into(),
        }
    }

    pub fn edit(path: impl Into<String>, content: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            action: EditAction::Edit,
            ..Self::create(path, content, summary)
        }
    }

    pub fn delete(path: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            action: EditAction::Delete,
            path: path.into(),
            content: None,
            language: None,
            summary: summary.into(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// What happened to one path during an apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub action: EditAction,
    pub path: String,
    /// Whether the path existed before this operation
    pub existed: bool,
}

impl AppliedChange {
    /// Short human description for the user-visible log
    pub fn describe(&self) -> String {
        match (self.action, self.existed) {
            (EditAction::Delete, true) => format!("Deleted {}", self.path),
            (EditAction::Delete, false) => format!("{} was already gone", self.path),
            (_, true) => format!("Updated {}", self.path),
            (_, false) => format!("Created {}", self.path),
        }
    }
}

/// Outcome of applying one backend reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub changes: Vec<AppliedChange>,
    /// First non-delete path that is not the reserved answer file
    pub selected_path: Option<String>,
    /// Last non-empty operation summary
    pub summary: Option<String>,
}

/// Apply operations in order
///
/// `Create` and `Edit` upsert (missing content becomes empty, missing
/// language is inferred), `Delete` removes the path if present.
pub fn apply_operations(model: &mut FileModel, operations: &[EditOperation], response_path: &str) -> ApplyReport {
    let mut report = ApplyReport::default();

    for op in operations {
        let path = op.path.trim();
        if path.is_empty() {
            debug!("Skipping {} operation without a path", op.action);
            continue;
        }

        let existed = match op.action {
            EditAction::Create | EditAction::Edit => {
                let file = VirtualFile::new(
                    path,
                    op.content.clone().unwrap_or_default(),
                    op.language.as_deref(),
                );
                let existed = model.upsert(file);
                if report.selected_path.is_none() && path != response_path {
                    report.selected_path = Some(path.to_string());
                }
                existed
            }
            EditAction::Delete => model.remove(path),
        };

        if !op.summary.trim().is_empty() {
            report.summary = Some(op.summary.trim().to_string());
        }

        report.changes.push(AppliedChange {
            action: op.action,
            path: path.to_string(),
            existed,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_then_delete_leaves_path_absent() {
        let mut model = FileModel::with_bootstrap("index.html");
        let ops = vec![
            EditOperation::edit("app.js", "console.log(1)", "Added script"),
            EditOperation::delete("app.js", "Removed script"),
        ];
        let report = apply_operations(&mut model, &ops, "response.md");
        assert!(!model.contains("app.js"));
        assert_eq!(report.changes.len(), 2);
        assert!(report.changes[1].existed);
    }

    #[test]
    fn test_create_reads_back_content_and_language() {
        let mut model = FileModel::new();
        let ops = vec![
            EditOperation::create("button.html", "<button>Go</button>", "Added the button."),
            EditOperation::create("theme.txt", "dark", "").with_language("css"),
        ];
        apply_operations(&mut model, &ops, "response.md");

        let button = model.get("button.html").unwrap();
        assert_eq!(button.content, "<button>Go</button>");
        assert_eq!(button.language, "html");
        assert_eq!(model.get("theme.txt").unwrap().language, "css");
    }

    #[test]
    fn test_missing_content_defaults_to_empty() {
        let mut model = FileModel::new();
        let op = EditOperation {
            action: EditAction::Create,
            path: "empty.css".into(),
            content: None,
            language: None,
            summary: String::new(),
        };
        apply_operations(&mut model, &[op], "response.md");
        assert_eq!(model.get("empty.css").unwrap().content, "");
    }

    #[test]
    fn test_selection_skips_deletes_and_answer_file() {
        let mut model = FileModel::with_bootstrap("index.html");
        let ops = vec![
            EditOperation::delete("old.css", "Removed old styles"),
            EditOperation::create("response.md", "Here is the answer", "Answered"),
            EditOperation::edit("style.css", "body{}", "Restyled"),
            EditOperation::edit("index.html", "<p/>", ""),
        ];
        let report = apply_operations(&mut model, &ops, "response.md");
        assert_eq!(report.selected_path.as_deref(), Some("style.css"));
        // last non-empty summary wins
        assert_eq!(report.summary.as_deref(), Some("Restyled"));
    }

    #[test]
    fn test_only_answer_file_selects_nothing() {
        let mut model = FileModel::new();
        let ops = vec![EditOperation::create("response.md", "42", "The answer is 42.")];
        let report = apply_operations(&mut model, &ops, "response.md");
        assert!(report.selected_path.is_none());
        assert_eq!(report.summary.as_deref(), Some("The answer is 42."));
    }

    #[test]
    fn test_delete_absent_is_not_an_error() {
        let mut model = FileModel::new();
        let report = apply_operations(&mut model, &[EditOperation::delete("ghost.js", "")], "response.md");
        assert_eq!(report.changes[0].describe(), "ghost.js was already gone");
        assert!(report.summary.is_none());
    }

    #[test]
    fn test_wire_format() {
        let json = r#"[{"action":"create","path":"a.css","content":"x","summary":"s"},
                       {"action":"delete","path":"b.js"}]"#;
        let ops: Vec<EditOperation> = serde_json::from_str(json).unwrap();
        assert_eq!(ops[0].action, EditAction::Create);
        assert_eq!(ops[1].action, EditAction::Delete);
        assert_eq!(ops[1].summary, "");
    }
}
