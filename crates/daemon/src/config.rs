use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dbkeeper_engine::{AdmissionPolicy, ConnectionInfo, NotifySettings, Schedule};
use serde::Deserialize;
use thiserror::Error;

/// Raw config file shape. Every leaf is optional so that validation can
/// report all missing fields at once instead of stopping at the first.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub notify: NotifyConfig,
    pub admission: AdmissionConfig,
    pub dump: DumpConfig,
    pub schedules: Vec<ScheduleConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct NotifyConfig {
    pub recipient: Option<String>,
    pub sender: Option<String>,
    pub sender_credentials: Option<String>,
    /// HTTP mail-gateway endpoint messages are POSTed to. Defaults to a
    /// local relay.
    pub endpoint: Option<String>,
    pub reporting_enabled: Option<bool>,
    pub report_cron: Option<String>,
    pub success_notify_every: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AdmissionConfig {
    /// `"ratio"` or `"margin"`.
    pub policy: Option<String>,
    pub reserved_fraction: Option<f64>,
    pub safety_multiplier: Option<u64>,
    pub mount_point: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DumpConfig {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ScheduleConfig {
    pub name: Option<String>,
    pub cron: Option<String>,
    pub directory: Option<PathBuf>,
    pub max_backups: Option<usize>,
}

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8025/api/v1/send";
pub const DEFAULT_REPORT_CRON: &str = "0 0 9 * * *";

/// Fatal at startup. Lists every structural problem in the file, not just
/// the first one found.
#[derive(Debug, Error)]
#[error("invalid configuration:\n  {}", problems.join("\n  "))]
pub struct ConfigValidationError {
    pub problems: Vec<String>,
}

/// Everything validated and defaulted, ready for wiring.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionInfo,
    pub notify: NotifySettings,
    pub notifier_endpoint: String,
    pub sender_credentials: String,
    pub reporting_enabled: bool,
    pub report_cron: String,
    pub policy: AdmissionPolicy,
    pub mount_point: PathBuf,
    pub dump_timeout: Option<Duration>,
    pub schedules: Vec<Schedule>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path:?}"))?;
    toml::from_str(&contents).with_context(|| format!("parsing config file {path:?}"))
}

/// Structural validation. Aggregates every missing or contradictory field
/// into one `ConfigValidationError`.
pub fn validate(config: Config) -> Result<Settings, ConfigValidationError> {
    let mut problems = Vec::new();

    let mut require = |field: Option<String>, name: &str| -> String {
        match field {
            Some(value) => value,
            None => {
                problems.push(format!("{name} is required"));
                String::new()
            }
        }
    };

    let host = require(config.database.host, "database.host");
    let user = require(config.database.user, "database.user");
    let password = require(config.database.password, "database.password");
    let database = require(config.database.database, "database.database");
    let recipient = require(config.notify.recipient, "notify.recipient");
    let sender = require(config.notify.sender, "notify.sender");
    let sender_credentials = require(config.notify.sender_credentials, "notify.sender_credentials");

    let reporting_enabled = match config.notify.reporting_enabled {
        Some(enabled) => enabled,
        None => {
            problems.push("notify.reporting_enabled is required".to_owned());
            false
        }
    };

    if config.schedules.is_empty() {
        problems.push("at least one [[schedules]] entry is required".to_owned());
    }

    let mut schedules = Vec::new();
    let mut seen_directories = HashSet::new();
    for (index, schedule) in config.schedules.into_iter().enumerate() {
        // Report every missing field of the entry before skipping it.
        if schedule.cron.is_none() {
            problems.push(format!("schedules[{index}].cron is required"));
        }
        if schedule.directory.is_none() {
            problems.push(format!("schedules[{index}].directory is required"));
        }
        if schedule.max_backups.is_none() {
            problems.push(format!("schedules[{index}].max_backups is required"));
        }
        let (Some(cron), Some(directory), Some(max_backups)) =
            (schedule.cron, schedule.directory, schedule.max_backups)
        else {
            continue;
        };
        // Directory ownership is exclusive per schedule.
        if !seen_directories.insert(directory.clone()) {
            problems.push(format!(
                "schedules[{index}].directory {} is already used by another schedule",
                directory.display()
            ));
            continue;
        }
        let name = schedule
            .name
            .or_else(|| {
                directory
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| format!("schedule-{index}"));
        schedules.push(Schedule {
            name,
            cron,
            directory,
            max_backups,
        });
    }

    let policy = match config.admission.policy.as_deref() {
        None | Some("margin") => AdmissionPolicy::Margin {
            safety_multiplier: config
                .admission
                .safety_multiplier
                .unwrap_or(AdmissionPolicy::DEFAULT_SAFETY_MULTIPLIER),
        },
        Some("ratio") => AdmissionPolicy::Ratio {
            reserved_fraction: config
                .admission
                .reserved_fraction
                .unwrap_or(AdmissionPolicy::DEFAULT_RESERVED_FRACTION),
        },
        Some(other) => {
            problems.push(format!(
                "admission.policy must be \"ratio\" or \"margin\", got {other:?}"
            ));
            AdmissionPolicy::Margin {
                safety_multiplier: AdmissionPolicy::DEFAULT_SAFETY_MULTIPLIER,
            }
        }
    };

    if !problems.is_empty() {
        return Err(ConfigValidationError { problems });
    }

    Ok(Settings {
        connection: ConnectionInfo {
            host,
            user,
            password,
            database,
        },
        notify: NotifySettings {
            recipient,
            sender,
            success_notify_every: config.notify.success_notify_every.unwrap_or(1),
        },
        notifier_endpoint: config
            .notify
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
        sender_credentials,
        reporting_enabled,
        report_cron: config
            .notify
            .report_cron
            .unwrap_or_else(|| DEFAULT_REPORT_CRON.to_owned()),
        policy,
        mount_point: config.admission.mount_point.unwrap_or_else(|| "/".into()),
        dump_timeout: config.dump.timeout_secs.map(Duration::from_secs),
        schedules,
    })
}
