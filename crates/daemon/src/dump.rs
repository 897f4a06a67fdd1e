use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dbkeeper_core::{artifact_file_name, EngineError};
use dbkeeper_engine::{ConnectionInfo, DumpExecutor};
use tokio::process::Command;
use tracing::debug;

/// Runs `mysqldump` into the schedule's directory.
///
/// The dump streams into `<millis>.sql.part` and is renamed into place only
/// on success, so a partially-written dump is never visible as an artifact
/// and can never be selected for eviction.
pub struct MysqldumpExecutor {
    command: String,
    timeout: Option<Duration>,
}

impl MysqldumpExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            command: "mysqldump".to_owned(),
            timeout,
        }
    }

    /// Overrides the dump binary, for tests and wrapper scripts.
    pub fn with_command(command: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DumpExecutor for MysqldumpExecutor {
    async fn dump(&self, connection: &ConnectionInfo, destination: &Path) -> Result<String> {
        let name = artifact_file_name(Utc::now().timestamp_millis());
        let part_path = destination.join(format!("{name}.part"));
        let final_path = destination.join(&name);

        let part_file = std::fs::File::create(&part_path)
            .with_context(|| format!("create dump file {}", part_path.display()))?;
        // Removes the .part file on every early return; disarmed once the
        // dump is renamed into place.
        let mut part_guard = PartGuard {
            path: &part_path,
            armed: true,
        };

        let mut command = Command::new(&self.command);
        command
            .arg("--host")
            .arg(&connection.host)
            .arg("--user")
            .arg(&connection.user)
            .arg(&connection.database)
            // Password through the environment, never argv.
            .env("MYSQL_PWD", &connection.password)
            .stdin(Stdio::null())
            .stdout(Stdio::from(part_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %self.command, database = %connection.database, "starting dump");
        let child = command
            .spawn()
            .with_context(|| format!("spawn {}", self.command))?;

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_elapsed) => {
                    return Err(EngineError::Dump(format!(
                        "dump timed out after {}s",
                        limit.as_secs()
                    ))
                    .into());
                }
            },
            None => child.wait_with_output().await,
        }
        .with_context(|| format!("wait for {}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Dump(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ))
            .into());
        }

        std::fs::rename(&part_path, &final_path)
            .with_context(|| format!("finalize dump {}", final_path.display()))?;
        part_guard.armed = false;
        Ok(name)
    }
}

struct PartGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl Drop for PartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(self.path);
        }
    }
}
