//! Schedule evaluation.
//!
//! The evaluator never looks at the wall clock: callers hand it a time window
//! and it answers which tasks fell due inside it. The host decides how often
//! to ask (the server ticks once a minute, tests jump the clock).

use crate::config::ScheduleConfig;
use crate::models::JobType;
use crate::utils::{EngineError, Result};
use chrono::{DateTime, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", content = "jobType", rename_all = "snake_case")]
pub enum ScheduledTask {
    Backup(JobType),
    RetentionSweep,
    Verification,
}

impl fmt::Display for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledTask::Backup(t) => write!(f, "backup:{t}"),
            ScheduledTask::RetentionSweep => f.write_str("retention"),
            ScheduledTask::Verification => f.write_str("verification"),
        }
    }
}

/// Parse a 5- or 6-field cron expression.
pub fn parse_cron(expression: &str) -> std::result::Result<Cron, String> {
    Cron::new(expression)
        .with_seconds_optional()
        .parse()
        .map_err(|e| format!("invalid cron expression '{expression}': {e}"))
}

struct Trigger {
    task: ScheduledTask,
    expression: String,
    cron: Cron,
}

pub struct ScheduleEvaluator {
    triggers: Vec<Trigger>,
}

impl ScheduleEvaluator {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let mut triggers = Vec::new();
        for (name, expr) in config.entries() {
            let Some(expr) = expr else { continue };
            let task = match name {
                "incremental" => ScheduledTask::Backup(JobType::Incremental),
                "full" => ScheduledTask::Backup(JobType::Full),
                "archive" => ScheduledTask::Backup(JobType::Archive),
                "retention" => ScheduledTask::RetentionSweep,
                _ => ScheduledTask::Verification,
            };
            let cron = parse_cron(expr).map_err(EngineError::Config)?;
            triggers.push(Trigger {
                task,
                expression: expr.to_string(),
                cron,
            });
        }
        Ok(Self { triggers })
    }

    /// Tasks with at least one occurrence in `(from, to]`, in trigger order.
    pub fn due_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<ScheduledTask> {
        if to <= from {
            return Vec::new();
        }
        self.triggers
            .iter()
            .filter(|t| match t.cron.find_next_occurrence(&from, false) {
                Ok(next) => next <= to,
                Err(e) => {
                    tracing::warn!(cron = %t.expression, error = %e, "Failed to evaluate schedule");
                    false
                }
            })
            .map(|t| t.task)
            .collect()
    }

    /// Next backup of any type strictly after `after`.
    pub fn next_backup_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.triggers
            .iter()
            .filter(|t| matches!(t.task, ScheduledTask::Backup(_)))
            .filter_map(|t| t.cron.find_next_occurrence(&after, false).ok())
            .min()
    }
}
