use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// Database connection descriptor handed to the dump executor.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Produces one backup artifact in `destination`, returning its file name.
///
/// Implementations fail with `EngineError::Dump`; a partially-written dump
/// must never be left behind under an artifact name.
#[async_trait]
pub trait DumpExecutor: Send + Sync {
    async fn dump(&self, connection: &ConnectionInfo, destination: &Path) -> Result<String>;
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
}

/// Delivers a rendered message. Implementations fail with
/// `EngineError::Delivery`; callers log and drop such failures, a failed
/// notification never aborts the backup it was reporting on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Who notifications go to and come from, plus the success cadence:
/// every Nth success sends a message, N = 1 means every success.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub recipient: String,
    pub sender: String,
    pub success_notify_every: u32,
}
