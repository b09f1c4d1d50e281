//! Leaf handler interfaces (spec §1 "Input/file/process handlers (leaf)",
//! §6 "only their interfaces are specified"). The concrete input drivers,
//! OS media session bridge, filesystem walker, and process enumerator are
//! host-process collaborators; this module defines the boundary the
//! dispatcher calls through and a `NullHandlers` implementation that logs
//! and no-ops, so the engine is runnable (and testable) without a host.

pub mod file_explorer;
pub mod input;
pub mod media;
pub mod task_manager;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub use file_explorer::FileExplorerHandler;
pub use input::InputHandler;
pub use media::MediaHandler;
pub use task_manager::TaskManagerHandler;

/// Opaque pass-through: clipboard payloads are forwarded verbatim per
/// spec §4.E ("clipboard | (opaque) | external handler").
#[async_trait]
pub trait ClipboardHandler: Send + Sync {
    async fn handle(&self, payload: Value);
}

pub struct NullClipboardHandler;

#[async_trait]
impl ClipboardHandler for NullClipboardHandler {
    async fn handle(&self, _payload: Value) {
        tracing::debug!("clipboard payload dropped: no host clipboard handler installed");
    }
}

/// The bundle of leaf handlers a [`crate::dispatcher::Dispatcher`] routes
/// decoded commands to.
pub struct Handlers {
    pub input: Box<dyn InputHandler>,
    /// `Arc` rather than `Box`: the media-state push loop (spec §4.F) needs
    /// its own handle to the same handler the dispatcher calls through.
    pub media: Arc<dyn MediaHandler>,
    pub file_explorer: Box<dyn FileExplorerHandler>,
    pub task_manager: Box<dyn TaskManagerHandler>,
    pub clipboard: Box<dyn ClipboardHandler>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            input: Box::new(input::NullInputHandler),
            media: Arc::new(media::NullMediaHandler),
            file_explorer: Box::new(file_explorer::NullFileExplorerHandler),
            task_manager: Box::new(task_manager::NullTaskManagerHandler),
            clipboard: Box::new(NullClipboardHandler),
        }
    }
}
