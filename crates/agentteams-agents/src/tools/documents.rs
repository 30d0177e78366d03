//! Outline and document tools over one working directory.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Tool, ToolError, parse_args};

/// Root directory every document path is resolved against.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Creates `root` if it does not exist yet.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `file_name`; absolute paths and `..` are rejected.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, ToolError> {
        let relative = ensure_relpath(file_name)?;
        Ok(self.root.join(relative))
    }

    /// File names directly under the root, sorted.
    pub async fn list(&self) -> Result<Vec<String>, ToolError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn write(&self, file_name: &str, contents: &str) -> Result<(), ToolError> {
        let path = self.resolve(file_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        debug!(path = %path.display(), bytes = contents.len(), "document written");
        Ok(())
    }

    async fn read(&self, file_name: &str) -> Result<String, ToolError> {
        let path = self.resolve(file_name)?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

fn ensure_relpath(path: &str) -> Result<PathBuf, ToolError> {
    if path.trim().is_empty() {
        return Err(ToolError::InvalidArguments("file_name must not be empty".into()));
    }
    let pb = PathBuf::from(path);
    if pb.is_absolute() {
        return Err(ToolError::InvalidArguments(format!(
            "path `{path}` may not be absolute"
        )));
    }
    if pb
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(ToolError::InvalidArguments(format!(
            "path `{path}` may not contain parent components (..)"
        )));
    }
    Ok(pb)
}

pub struct CreateOutline {
    store: DocumentStore,
}

impl CreateOutline {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct OutlineArgs {
    points: Vec<String>,
    file_name: String,
}

#[async_trait]
impl Tool for CreateOutline {
    fn name(&self) -> &str {
        "create_outline"
    }

    fn description(&self) -> &str {
        "Create and save an outline."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "points": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of main points or sections."
                },
                "file_name": {"type": "string", "description": "File path to save the outline."}
            },
            "required": ["points", "file_name"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: OutlineArgs = parse_args(arguments)?;
        let outline: String = args
            .points
            .iter()
            .enumerate()
            .map(|(i, point)| format!("{}. {}\n", i + 1, point))
            .collect();
        self.store.write(&args.file_name, &outline).await?;
        Ok(format!("Outline saved to {}", args.file_name))
    }
}

pub struct ReadDocument {
    store: DocumentStore,
}

impl ReadDocument {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct ReadArgs {
    file_name: String,
    #[serde(default)]
    start: Option<usize>,
    #[serde(default)]
    end: Option<usize>,
}

#[async_trait]
impl Tool for ReadDocument {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read the specified document."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string", "description": "File path to read the document from."},
                "start": {"type": "integer", "description": "The start line. Default is 0"},
                "end": {"type": "integer", "description": "The end line. Default is None"}
            },
            "required": ["file_name"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: ReadArgs = parse_args(arguments)?;
        let contents = self.store.read(&args.file_name).await?;
        let lines: Vec<&str> = contents.lines().collect();
        Ok(slice_lines(&lines, args.start, args.end).join("\n"))
    }
}

fn slice_lines<'a>(lines: &'a [&'a str], start: Option<usize>, end: Option<usize>) -> &'a [&'a str] {
    let end = end.unwrap_or(lines.len()).min(lines.len());
    let start = start.unwrap_or(0).min(end);
    &lines[start..end]
}

pub struct WriteDocument {
    store: DocumentStore,
}

impl WriteDocument {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct WriteArgs {
    content: String,
    file_name: String,
}

#[async_trait]
impl Tool for WriteDocument {
    fn name(&self) -> &str {
        "write_document"
    }

    fn description(&self) -> &str {
        "Create and save a text document."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "Text content to be written into the document."},
                "file_name": {"type": "string", "description": "File path to save the document."}
            },
            "required": ["content", "file_name"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: WriteArgs = parse_args(arguments)?;
        self.store.write(&args.file_name, &args.content).await?;
        Ok(format!("Document saved to {}", args.file_name))
    }
}

pub struct EditDocument {
    store: DocumentStore,
}

impl EditDocument {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct EditArgs {
    file_name: String,
    inserts: BTreeMap<i64, String>,
}

#[async_trait]
impl Tool for EditDocument {
    fn name(&self) -> &str {
        "edit_document"
    }

    fn description(&self) -> &str {
        "Edit a document by inserting text at specific line numbers."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_name": {"type": "string", "description": "Path of the document to be edited."},
                "inserts": {
                    "type": "object",
                    "additionalProperties": {"type": "string"},
                    "description": "Dictionary where key is the line number (1-indexed) and value is the text to be inserted at that line."
                }
            },
            "required": ["file_name", "inserts"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: EditArgs = parse_args(arguments)?;
        let contents = self.store.read(&args.file_name).await?;
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();

        match apply_inserts(&mut lines, &args.inserts) {
            Ok(()) => {
                let mut updated = lines.join("\n");
                updated.push('\n');
                self.store.write(&args.file_name, &updated).await?;
                Ok(format!("Document edited and saved to {}", args.file_name))
            }
            Err(line_number) => Ok(format!("Error: Line number {line_number} is out of range.")),
        }
    }
}

/// Inserts in ascending line order; each number is checked against the
/// document as already edited. Returns the first out-of-range number.
fn apply_inserts(lines: &mut Vec<String>, inserts: &BTreeMap<i64, String>) -> Result<(), i64> {
    for (&line_number, text) in inserts {
        if line_number < 1 || line_number as usize > lines.len() + 1 {
            return Err(line_number);
        }
        lines.insert(line_number as usize - 1, text.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, DocumentStore) {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("workspace")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn outline_is_numbered_from_one() {
        let (_dir, store) = store();
        let reply = CreateOutline::new(store.clone())
            .call(json!({"points": ["Intro", "Body"], "file_name": "outline.txt"}))
            .await
            .unwrap();
        assert_eq!(reply, "Outline saved to outline.txt");
        let saved = std::fs::read_to_string(store.root().join("outline.txt")).unwrap();
        assert_eq!(saved, "1. Intro\n2. Body\n");
    }

    #[tokio::test]
    async fn read_returns_requested_line_range() {
        let (_dir, store) = store();
        std::fs::write(store.root().join("doc.txt"), "a\nb\nc\nd\n").unwrap();
        let tool = ReadDocument::new(store);

        let all = tool.call(json!({"file_name": "doc.txt"})).await.unwrap();
        assert_eq!(all, "a\nb\nc\nd");
        let middle = tool
            .call(json!({"file_name": "doc.txt", "start": 1, "end": 3}))
            .await
            .unwrap();
        assert_eq!(middle, "b\nc");
        let past_end = tool
            .call(json!({"file_name": "doc.txt", "start": 10}))
            .await
            .unwrap();
        assert_eq!(past_end, "");
    }

    #[tokio::test]
    async fn edit_inserts_in_ascending_order() {
        let (_dir, store) = store();
        std::fs::write(store.root().join("doc.txt"), "one\nthree\n").unwrap();

        let reply = EditDocument::new(store.clone())
            .call(json!({"file_name": "doc.txt", "inserts": {"4": "four", "2": "two"}}))
            .await
            .unwrap();
        assert_eq!(reply, "Document edited and saved to doc.txt");
        let saved = std::fs::read_to_string(store.root().join("doc.txt")).unwrap();
        assert_eq!(saved, "one\ntwo\nthree\nfour\n");
    }

    #[tokio::test]
    async fn edit_out_of_range_leaves_file_untouched() {
        let (_dir, store) = store();
        std::fs::write(store.root().join("doc.txt"), "one\n").unwrap();

        let reply = EditDocument::new(store.clone())
            .call(json!({"file_name": "doc.txt", "inserts": {"5": "five"}}))
            .await
            .unwrap();
        assert_eq!(reply, "Error: Line number 5 is out of range.");
        let saved = std::fs::read_to_string(store.root().join("doc.txt")).unwrap();
        assert_eq!(saved, "one\n");
    }

    #[tokio::test]
    async fn path_escapes_are_rejected() {
        let (_dir, store) = store();
        let tool = WriteDocument::new(store);
        for name in ["../escape.txt", "/etc/passwd", "nested/../../x"] {
            let err = tool
                .call(json!({"content": "x", "file_name": name}))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn write_creates_nested_directories_and_lists_top_level_files() {
        let (_dir, store) = store();
        let tool = WriteDocument::new(store.clone());
        tool.call(json!({"content": "hi", "file_name": "b.md"})).await.unwrap();
        tool.call(json!({"content": "hi", "file_name": "a.md"})).await.unwrap();
        tool.call(json!({"content": "hi", "file_name": "charts/c.md"}))
            .await
            .unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a.md", "b.md"]);
    }

    #[test]
    fn missing_arguments_are_reported() {
        let err = parse_args::<WriteArgs>(json!({"content": "x"})).err().unwrap();
        assert!(err.to_string().contains("file_name"));
    }
}
