use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

/// Cadence of one periodic task, parsed from a cron expression.
///
/// Expressions are validated once at startup; the trigger loops only ever
/// ask for the next fire time.
#[derive(Debug, Clone)]
pub struct TriggerCadence {
    schedule: CronSchedule,
}

impl TriggerCadence {
    pub fn parse(expression: &str) -> Result<Self> {
        let schedule = CronSchedule::from_str(expression)
            .with_context(|| format!("invalid cron expression {expression:?}"))?;
        Ok(Self { schedule })
    }

    /// Next fire time strictly after `now`. `None` means the expression has
    /// no future firings.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hourly_cadence_advances() {
        let cadence = TriggerCadence::parse("0 0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap();
        let next = cadence.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected_at_parse() {
        let err = TriggerCadence::parse("every tuesday-ish").unwrap_err();
        assert!(err.to_string().contains("invalid cron expression"));
    }
}
