//! Built-in tools for the command pipeline

mod files;
mod memory;
mod shell;

use std::path::PathBuf;

pub use files::FileTool;
pub use memory::MemoryTool;
pub use shell::ShellTool;

/// Expand a leading `~` to the home directory
pub(crate) fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    } else if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    PathBuf::from(path)
}

/// First string value among `keys`
pub(crate) fn str_param<'a>(
    params: &'a serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| params.get(*k).and_then(|v| v.as_str()))
}
