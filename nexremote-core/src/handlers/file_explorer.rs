//! Filesystem browsing adapter (spec §4.E `file_explorer`). Blocking I/O
//! offloaded to the worker pool per spec §4.E dispatcher policy; the
//! concrete walker/transfer mechanics are the host's to provide.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait FileExplorerHandler: Send + Sync {
    async fn handle(&self, action: &str, body: &Value) -> Value;
}

pub struct NullFileExplorerHandler;

#[async_trait]
impl FileExplorerHandler for NullFileExplorerHandler {
    async fn handle(&self, action: &str, _body: &Value) -> Value {
        tracing::debug!(%action, "file_explorer action rejected: no host file handler installed");
        serde_json::json!({"error": "file explorer not available"})
    }
}

pub const FILE_EXPLORER_ACTIONS: &[&str] = &[
    "list",
    "open",
    "read_file",
    "write_file",
    "create_folder",
    "create_file",
    "rename",
    "delete",
    "copy",
    "move",
    "search",
    "properties",
];
