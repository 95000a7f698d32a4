//! File manager tool: read, write, list, patch and delete

use aide_agent::Tool;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::fs;

use super::{expand_path, str_param};

/// Maximum lines returned by a read
const MAX_LINES: usize = 2000;

pub struct FileTool;

impl FileTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn read(path: &str) -> String {
    let content = match fs::read_to_string(expand_path(path)).await {
        Ok(c) => c,
        Err(e) => return format!("Error: failed to read {}: {}", path, e),
    };
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() <= MAX_LINES {
        return content;
    }
    format!(
        "{}\n\n... ({} more lines not shown)",
        lines[..MAX_LINES].join("\n"),
        lines.len() - MAX_LINES
    )
}

async fn write(path: &str, content: &str) -> String {
    let target = expand_path(path);
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return format!("Error: failed to create directory: {}", e);
            }
        }
    }
    match fs::write(&target, content).await {
        Ok(()) => format!("Successfully wrote {} bytes to {}", content.len(), path),
        Err(e) => format!("Error: failed to write {}: {}", path, e),
    }
}

async fn list(path: &str) -> String {
    let mut dir = match fs::read_dir(expand_path(path)).await {
        Ok(d) => d,
        Err(e) => return format!("Error: failed to list {}: {}", path, e),
    };
    let mut names = Vec::new();
    loop {
        match dir.next_entry().await {
            Ok(Some(entry)) => {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    name.push('/');
                }
                names.push(name);
            }
            Ok(None) => break,
            Err(e) => return format!("Error: failed to list {}: {}", path, e),
        }
    }
    if names.is_empty() {
        return "(empty directory)".to_string();
    }
    names.sort();
    names.join("\n")
}

async fn patch(path: &str, search: &str, replace: &str) -> String {
    let target = expand_path(path);
    let content = match fs::read_to_string(&target).await {
        Ok(c) => c,
        Err(e) => return format!("Error: failed to read {}: {}", path, e),
    };
    if search.is_empty() || !content.contains(search) {
        return format!("Error: search text not found in {}", path);
    }
    let patched = content.replacen(search, replace, 1);
    match fs::write(&target, patched).await {
        Ok(()) => format!("Patched {}", path),
        Err(e) => format!("Error: failed to write {}: {}", path, e),
    }
}

async fn delete(path: &str) -> String {
    let target = expand_path(path);
    match fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => format!("Error: {} is a directory, refusing to delete", path),
        Ok(_) => match fs::remove_file(&target).await {
            Ok(()) => format!("Deleted {}", path),
            Err(e) => format!("Error: failed to delete {}: {}", path, e),
        },
        Err(e) => format!("Error: failed to delete {}: {}", path, e),
    }
}

#[async_trait]
impl Tool for FileTool {
    fn name(&self) -> &str {
        "file_manager"
    }

    fn description(&self) -> &str {
        "File operations (file_op): read, write, list, patch (search_text -> replace_text), delete."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
                "search_text": { "type": "string" },
                "replace_text": { "type": "string" }
            }
        }))
    }

    async fn invoke(&self, _kind: &str, sub_action: Option<&str>, params: &Map<String, Value>) -> String {
        let sub_action = sub_action.unwrap_or("read");
        let path = str_param(params, &["path"]);
        tracing::debug!(sub_action, ?path, "file operation");

        match (sub_action, path) {
            ("list", path) => list(path.unwrap_or(".")).await,
            (_, None) => format!("Error: '{}' needs a path", sub_action),
            ("read", Some(path)) => read(path).await,
            ("write", Some(path)) => write(path, str_param(params, &["content"]).unwrap_or_default()).await,
            ("patch", Some(path)) => {
                patch(
                    path,
                    str_param(params, &["search_text"]).unwrap_or_default(),
                    str_param(params, &["replace_text"]).unwrap_or_default(),
                )
                .await
            }
            ("delete", Some(path)) => delete(path).await,
            (other, Some(_)) => format!("Error: unknown file operation '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn scratch_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("aide-files-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_write_read_patch_delete() {
        let dir = scratch_dir();
        let file = dir.join("notes.txt");
        let path = file.to_string_lossy().to_string();
        let tool = FileTool::new();

        let out = tool
            .invoke("file_op", Some("write"), &params(&[("path", &path), ("content", "hello world")]))
            .await;
        assert!(out.starts_with("Successfully wrote 11 bytes"));

        let out = tool.invoke("file_op", Some("read"), &params(&[("path", &path)])).await;
        assert_eq!(out, "hello world");

        let out = tool
            .invoke(
                "file_op",
                Some("patch"),
                &params(&[("path", &path), ("search_text", "world"), ("replace_text", "rust")]),
            )
            .await;
        assert_eq!(out, format!("Patched {}", path));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello rust");

        let dir_str = dir.to_string_lossy().to_string();
        let out = tool.invoke("file_op", Some("list"), &params(&[("path", &dir_str)])).await;
        assert_eq!(out, "notes.txt");

        let out = tool.invoke("file_op", Some("delete"), &params(&[("path", &path)])).await;
        assert!(out.starts_with("Deleted"));
        assert!(!file.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_errors_are_reported_as_text() {
        let tool = FileTool::new();
        let missing = scratch_dir().join("missing.txt").to_string_lossy().to_string();

        let out = tool.invoke("file_op", Some("read"), &params(&[("path", &missing)])).await;
        assert!(out.starts_with("Error: failed to read"));

        let out = tool.invoke("file_op", Some("write"), &Map::new()).await;
        assert!(out.contains("needs a path"));

        let out = tool
            .invoke("file_op", Some("chmod"), &params(&[("path", &missing)]))
            .await;
        assert!(out.contains("unknown file operation"));
    }

    #[tokio::test]
    async fn test_patch_without_match() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.txt");
        std::fs::write(&file, "abc").unwrap();
        let path = file.to_string_lossy().to_string();

        let out = FileTool::new()
            .invoke(
                "file_op",
                Some("patch"),
                &params(&[("path", &path), ("search_text", "xyz"), ("replace_text", "q")]),
            )
            .await;
        assert!(out.contains("search text not found"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
