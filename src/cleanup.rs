//! Background scheduler for periodic maintenance.

use crate::db::Database;
use crate::tasks::ScheduledTask;
use std::time::Duration;
use tracing::error;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Tasks run on every tick, in order.
const PERIODIC_TASKS: [ScheduledTask; 3] = [
    ScheduledTask::SessionCleanup,
    ScheduledTask::AppointmentReminders,
    ScheduledTask::CompletePastAppointments,
];

/// Run all periodic tasks once. Failures are logged and do not stop later tasks.
pub async fn run_cleanup(db: &Database) {
    for task in PERIODIC_TASKS {
        if let Err(e) = task.run(db).await {
            error!(task = %task, "Scheduled task failed: {}", e);
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
