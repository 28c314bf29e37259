//! Maintenance tasks that run on a schedule or on an admin's request.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::db::{Database, from_secs, now_secs};
use crate::session::{SessionStore, StoreError};

/// Reminders go out for appointments starting within this window.
const REMINDER_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledTask {
    AppointmentReminders,
    SessionCleanup,
    CompletePastAppointments,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown task: {0}")]
pub struct UnknownTask(pub String);

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScheduledTask {
    pub const ALL: [ScheduledTask; 3] = [
        ScheduledTask::AppointmentReminders,
        ScheduledTask::SessionCleanup,
        ScheduledTask::CompletePastAppointments,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScheduledTask::AppointmentReminders => "appointment-reminders",
            ScheduledTask::SessionCleanup => "session-cleanup",
            ScheduledTask::CompletePastAppointments => "complete-past-appointments",
        }
    }

    pub async fn run(&self, db: &Database) -> Result<Value, TaskError> {
        let result = match self {
            ScheduledTask::AppointmentReminders => send_reminders(db).await?,
            ScheduledTask::SessionCleanup => {
                let purged = db.sessions().purge_expired().await?;
                json!({ "purged": purged })
            }
            ScheduledTask::CompletePastAppointments => {
                let completed = db.appointments().complete_past(now_secs()).await?;
                json!({ "completed": completed })
            }
        };
        info!(task = %self, result = %result, "Task finished");
        Ok(result)
    }
}

impl fmt::Display for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScheduledTask {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task| task.name() == s)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

async fn send_reminders(db: &Database) -> Result<Value, TaskError> {
    let now = now_secs();
    let due = db
        .appointments()
        .due_reminders(now, now + REMINDER_WINDOW_SECS)
        .await?;

    let mut sent = 0u64;
    for reminder in due {
        let at: DateTime<Utc> = from_secs(reminder.scheduled_at);
        let message = format!(
            "You have an appointment with {} on {}.",
            reminder.doctor_name,
            at.format("%Y-%m-%d at %H:%M UTC")
        );
        // A failed reminder is retried on the next run.
        match db
            .notifications()
            .create(reminder.patient_id, "Appointment reminder", &message, "reminder")
            .await
        {
            Ok(_) => {
                db.appointments().mark_reminded(reminder.id).await?;
                sent += 1;
            }
            Err(e) => error!(appointment = reminder.id, "Failed to send reminder: {}", e),
        }
    }
    Ok(json!({ "sent": sent }))
}
