//! Job that creates random users on a fixed interval.

use rand::prelude::RngExt;
use rand::rng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::models::users::UserCreate;
use crate::config::UserGeneratorConfig;
use crate::services::UserService;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Budi", "Citra", "Dewi", "Eko", "Fajar", "Grace", "Hana", "Indra", "Joko", "Kartika", "Linus", "Maya", "Nadia",
    "Oscar", "Putri", "Rina", "Sari", "Tono", "Wulan",
];

const LAST_NAMES: &[&str] = &[
    "Hopper", "Santoso", "Wijaya", "Lovelace", "Pratama", "Kusuma", "Torvalds", "Hidayat", "Saputra", "Lestari",
];

/// Build one random, valid user. Emails carry a random suffix so runs don't collide.
pub fn random_user() -> UserCreate {
    let mut rng = rng();
    let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
    let age = rng.random_range(18..=80);
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();

    UserCreate {
        name: format!("{first} {last}"),
        email: format!("{}.{}.{suffix}@example.com", first.to_lowercase(), last.to_lowercase()),
        age,
    }
}

pub struct UserGeneratorJob {
    users: UserService,
    config: UserGeneratorConfig,
}

impl UserGeneratorJob {
    pub fn new(users: UserService, config: UserGeneratorConfig) -> Self {
        Self { users, config }
    }

    /// Create one batch. Returns the number of users created.
    pub async fn run_once(&self) -> usize {
        let mut created = 0;
        for _ in 0..self.config.batch_size {
            let user = random_user();
            match self.users.create(user).await {
                Ok(_) => created += 1,
                Err(e) => tracing::warn!(error = %e, "User generator failed to create user"),
            }
        }
        created
    }

    /// Tick every `interval` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            "Starting user generator (every {:?}, batch of {})",
            self.config.interval,
            self.config.batch_size
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; wait a full interval before the first batch
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("User generator stopped");
                    return;
                }
                _ = interval.tick() => {
                    let created = self.run_once().await;
                    tracing::info!(created, requested = self.config.batch_size, "User generator run finished");
                }
            }
        }
    }
}
