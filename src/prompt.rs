//! Prompt construction
//!
//! The first query of a session carries the whole document (the assistant has
//! nothing yet). Every later query in the same session carries only the
//! cursor line and a couple of lines above it; the assistant keeps the earlier
//! document in its own session memory and can read the file when it needs more.

use crate::cursor::{context_window, insert_cursor_marker, line_number_at};
use crate::error::TemplateError;
use std::fs;
use std::path::{Path, PathBuf};

/// Substitution point for the cursor-annotated document.
pub const CONTENT_PLACEHOLDER: &str = "{{content}}";

/// Lines shown above the cursor line in follow-up prompts.
pub const FOLLOWUP_LINES_BEFORE: usize = 2;

pub const DEFAULT_TEMPLATE: &str = "\
You are a thoughtful writing companion reviewing a document while it is being written.
The author's cursor is marked with <CURSOR>. Focus on the text around the cursor.

Give brief, specific feedback on clarity, flow, and anything that reads as unfinished.
Do not rewrite the document. Keep the response under 150 words.

Document:
{{content}}
";

/// A user-editable template with exactly one [`CONTENT_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn parse(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        match text.matches(CONTENT_PLACEHOLDER).count() {
            0 => Err(TemplateError::MissingPlaceholder {
                placeholder: CONTENT_PLACEHOLDER,
            }),
            1 => Ok(Self { text }),
            count => Err(TemplateError::MultiplePlaceholders {
                placeholder: CONTENT_PLACEHOLDER,
                count,
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, document: &str) -> String {
        self.text.replacen(CONTENT_PLACEHOLDER, document, 1)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// One edit snapshot turned into a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub content: String,
    /// Character offset of the cursor
    pub cursor: usize,
    pub file_path: String,
}

/// Full-document prompt for a session the assistant has not seen yet.
pub fn build_bootstrap_prompt(template: &PromptTemplate, request: &PromptRequest) -> String {
    template.render(&insert_cursor_marker(&request.content, request.cursor))
}

/// Minimal prompt for a session that already holds the document.
pub fn build_followup_prompt(request: &PromptRequest) -> String {
    let cursor_line = line_number_at(&request.content, request.cursor);
    let lines: Vec<&str> = request.content.split('\n').collect();
    let context = context_window(&lines, cursor_line, FOLLOWUP_LINES_BEFORE);

    format!(
        "The author kept writing in {file}. The cursor is now on line {line}.\n\
         \n\
         Context around the cursor:\n\
         ```\n\
         {context}\n\
         ```\n\
         \n\
         You saw the full document earlier in this session. If you need more context, \
         read {file} with your file-reading tool.",
        file = request.file_path,
        line = cursor_line + 1,
        context = context,
    )
}

/// Pick the prompt shape for the current session state.
pub fn build_prompt(is_new_session: bool, template: &PromptTemplate, request: &PromptRequest) -> String {
    if is_new_session {
        build_bootstrap_prompt(template, request)
    } else {
        build_followup_prompt(request)
    }
}

/// File-backed prompt template with a built-in fallback.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location next to the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("marginalia").join("prompt-template.md"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the template; a missing file means the built-in default.
    pub fn load(&self) -> Result<PromptTemplate, TemplateError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => PromptTemplate::parse(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(PromptTemplate::default()),
            Err(source) => Err(TemplateError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn save(&self, text: &str) -> Result<PromptTemplate, TemplateError> {
        let template = PromptTemplate::parse(text)?;
        self.write(template.as_str())?;
        Ok(template)
    }

    pub fn restore_default(&self) -> Result<PromptTemplate, TemplateError> {
        self.write(DEFAULT_TEMPLATE)?;
        Ok(PromptTemplate::default())
    }

    fn write(&self, text: &str) -> Result<(), TemplateError> {
        let io_err = |source: std::io::Error| TemplateError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(&self.path, text).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CURSOR_MARKER;

    fn has_cursor_marker(prompt: &str) -> bool {
        prompt.contains(CURSOR_MARKER)
    }

    fn request(content: &str, cursor: usize) -> PromptRequest {
        PromptRequest {
            content: content.to_string(),
            cursor,
            file_path: "notes/draft.md".to_string(),
        }
    }

    #[test]
    fn test_template_requires_exactly_one_placeholder() {
        assert!(matches!(
            PromptTemplate::parse("no slot"),
            Err(TemplateError::MissingPlaceholder { .. })
        ));
        assert!(matches!(
            PromptTemplate::parse("{{content}} and {{content}}"),
            Err(TemplateError::MultiplePlaceholders { count: 2, .. })
        ));
        assert!(PromptTemplate::parse(DEFAULT_TEMPLATE).is_ok());
    }

    #[test]
    fn test_bootstrap_embeds_marked_document() {
        let template = PromptTemplate::parse("Review:\n{{content}}\nEnd").unwrap();
        let prompt = build_bootstrap_prompt(&template, &request("hello", 5));
        assert_eq!(prompt, "Review:\nhello<CURSOR>\nEnd");
    }

    #[test]
    fn test_bootstrap_with_stale_cursor_keeps_document() {
        let template = PromptTemplate::default();
        let prompt = build_bootstrap_prompt(&template, &request("hello", 42));
        assert!(prompt.contains("hello"));
        assert!(!prompt.contains(CONTENT_PLACEHOLDER));
    }

    #[test]
    fn test_followup_shows_window_and_hint() {
        let content = "one\ntwo\nthree\nfour\nfive";
        // Cursor at the start of "four" (line index 3).
        let prompt = build_followup_prompt(&request(content, 14));
        assert!(prompt.contains("notes/draft.md"));
        assert!(prompt.contains("line 4"));
        assert!(prompt.contains("2: two\n3: three\n4: four"));
        assert!(!prompt.contains("1: one"));
        assert!(!prompt.contains("five"));
        assert!(prompt.contains("file-reading tool"));
        assert!(!has_cursor_marker(&prompt));
    }

    #[test]
    fn test_build_prompt_selects_shape() {
        let template = PromptTemplate::default();
        let req = request("hello", 5);
        assert!(has_cursor_marker(&build_prompt(true, &template, &req)));
        assert!(!has_cursor_marker(&build_prompt(false, &template, &req)));
    }

    #[test]
    fn test_store_falls_back_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path().join("t").join("prompt.md"));

        assert_eq!(store.load().unwrap(), PromptTemplate::default());

        store.save("Custom {{content}}").unwrap();
        assert_eq!(store.load().unwrap().as_str(), "Custom {{content}}");

        assert!(store.save("broken").is_err());
        assert_eq!(store.load().unwrap().as_str(), "Custom {{content}}");

        store.restore_default().unwrap();
        assert_eq!(store.load().unwrap(), PromptTemplate::default());
    }
}
