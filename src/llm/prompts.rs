//! System prompt and request text for the coding backend

use crate::files::FileSnapshot;
use std::collections::BTreeMap;

/// System instruction sent with every edit request
pub const SYSTEM_PROMPT: &str = r#"You are Voiceflow, a voice-controlled coding assistant that edits a small web project.

The user speaks or types a request. You answer with JSON only:

{
  "reply": "one or two short sentences that will be read aloud",
  "operations": [
    {
      "action": "create" | "edit" | "delete",
      "path": "relative/path.ext",
      "content": "the COMPLETE new file content (omit for delete)",
      "language": "html | css | javascript | ...",
      "summary": "what changed in this file, one sentence"
    }
  ]
}

## Rules

1. Always send the complete file content for create and edit, never a diff
2. Prefer editing existing files over creating new ones
3. Keep markup, style and script in index.html, style.css and script.js unless asked otherwise
4. If the user only asks a question, answer in "reply", optionally writing the answer to response.md
5. If you cannot tell what to change, return an empty "operations" list
6. The reply is spoken: no code, no URLs, no markdown"#;

/// Build the user part of the request: project files, current file, instruction
pub fn build_user_prompt(
    files: &BTreeMap<String, FileSnapshot>,
    current_path: Option<&str>,
    instruction: Option<&str>,
) -> String {
    let mut prompt = String::from("## Project files\n\n");

    if files.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (path, file) in files {
        prompt.push_str(&format!(
            "### {} ({})\n```{}\n{}\n```\n\n",
            path, file.language, file.language, file.content
        ));
    }

    if let Some(path) = current_path {
        prompt.push_str(&format!("The user is looking at `{}`.\n\n", path));
    }

    match instruction {
        Some(text) => prompt.push_str(&format!("## Request\n\n{}\n", text.trim())),
        None => prompt.push_str("## Request\n\nThe request is in the attached audio.\n"),
    }

    prompt
}

/// Instruction for plain transcription of a short clip
pub const TRANSCRIBE_PROMPT: &str =
    "Transcribe this audio exactly. Answer with the spoken words only, or nothing if there is no speech.";
