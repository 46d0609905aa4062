//! Periodic background jobs.
//!
//! Jobs run as tokio tasks on the application's background task set and stop when the
//! shared shutdown token is cancelled. A failing run is logged and the job waits for its
//! next tick.

pub mod user_generator;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::services::UserService;

pub use user_generator::UserGeneratorJob;

/// Spawn every enabled job.
pub fn spawn_jobs(config: &SchedulerConfig, users: UserService, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if config.user_generator.enabled {
        let job = UserGeneratorJob::new(users, config.user_generator.clone());
        handles.push(tokio::spawn(job.run(shutdown)));
    } else {
        tracing::debug!("User generator job disabled");
    }

    handles
}
