//! Health and admin operations

use hive_mail_core::Result;
use hive_mail_db::{Store, StoreStats, micros_to_iso, queries};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StoreStats>,
}

/// Registered agent as listed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentView {
    pub name: String,
    pub program: String,
    pub model: String,
    pub task_description: String,
    pub first_seen: String,
    pub last_seen: String,
}

/// Cheap liveness probe (`SELECT 1`), optionally with projection counts.
pub async fn check_health(
    store: &Store,
    cancel: &CancellationToken,
    include_stats: bool,
) -> Result<HealthResponse> {
    let healthy = store.is_healthy(cancel).await;
    let stats = if healthy && include_stats {
        Some(store.stats(cancel).await?)
    } else {
        None
    };
    Ok(HealthResponse { healthy, stats })
}

/// Row counts of the log and the four projections.
pub async fn get_stats(store: &Store, cancel: &CancellationToken) -> Result<StoreStats> {
    Ok(store.stats(cancel).await?)
}

/// Drop and recreate every table — test support only.
pub async fn reset_project(store: &Store, cancel: &CancellationToken) -> Result<()> {
    tracing::warn!(project = store.project_key(), "resetting project store");
    Ok(store.reset(cancel).await?)
}

/// List registered agents in the project.
pub async fn list_agents(store: &Store, cancel: &CancellationToken) -> Result<Vec<AgentView>> {
    let project_key = store.project_key().to_string();
    let agents = store
        .db()
        .with_conn(cancel, move |conn| queries::list_agents(conn, &project_key))
        .await?;

    Ok(agents
        .into_iter()
        .map(|a| AgentView {
            name: a.name,
            program: a.program,
            model: a.model,
            task_description: a.task_description,
            first_seen: micros_to_iso(a.first_seen_ts),
            last_seen: micros_to_iso(a.last_seen_ts),
        })
        .collect())
}
