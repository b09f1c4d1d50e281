//! Process listing/management adapter (spec §4.E `task_manager`).
//! Blocking I/O offloaded to the worker pool per spec §4.E.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait TaskManagerHandler: Send + Sync {
    async fn handle(&self, action: &str, body: &Value) -> Value;
}

pub struct NullTaskManagerHandler;

#[async_trait]
impl TaskManagerHandler for NullTaskManagerHandler {
    async fn handle(&self, action: &str, _body: &Value) -> Value {
        tracing::debug!(%action, "task_manager action rejected: no host process handler installed");
        serde_json::json!({"error": "task manager not available"})
    }
}

pub const TASK_MANAGER_ACTIONS: &[&str] = &["list_processes", "end_process", "system_info"];
