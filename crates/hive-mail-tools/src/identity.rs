//! Agent registry operations

use hive_mail_core::events::{AgentHeartbeat, AgentRegistered, EventPayload};
use hive_mail_core::{Error, Result, generate_agent_name, is_valid_agent_name, sanitize_agent_name};
use hive_mail_db::{Store, log, queries};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Registration request.
///
/// When `agent_name` is omitted, one is generated from the adjective+noun
/// ensemble. A collision with an existing name is tolerated: registration
/// upserts, preserving `first_seen`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitAgent {
    pub agent_name: Option<String>,
    pub program: String,
    pub model: String,
    pub task_description: Option<String>,
}

/// The identity an agent carries through all later calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub project_key: String,
    pub agent_name: String,
}

/// Register an agent in the project, emitting `agent_registered`.
pub async fn init_agent(
    store: &Store,
    cancel: &CancellationToken,
    req: InitAgent,
) -> Result<AgentContext> {
    let agent_name = match req.agent_name {
        Some(raw) => {
            let name = sanitize_agent_name(&raw)
                .ok_or_else(|| Error::InvalidAgentName(raw.clone()))?;
            if !is_valid_agent_name(&name) {
                tracing::warn!(
                    name = %name,
                    "agent name is outside the adjective+noun ensemble; registering anyway"
                );
            }
            name
        }
        None => generate_agent_name(),
    };

    let payload = EventPayload::AgentRegistered(AgentRegistered {
        agent: agent_name.clone(),
        program: req.program,
        model: req.model,
        task_description: req.task_description.unwrap_or_default(),
    });
    log::append_event(store.db(), cancel, store.project_key(), payload).await?;

    tracing::info!(agent = %agent_name, project = store.project_key(), "agent registered");

    Ok(AgentContext {
        project_key: store.project_key().to_string(),
        agent_name,
    })
}

/// Record a liveness heartbeat for a registered agent.
pub async fn heartbeat(store: &Store, cancel: &CancellationToken, agent: &str) -> Result<()> {
    let project_key = store.project_key().to_string();
    let agent_name = agent.to_string();
    store
        .db()
        .transaction(cancel, move |conn| {
            if queries::get_agent(conn, &project_key, &agent_name)?.is_none() {
                return Err(hive_mail_db::DbError::not_found("agent", agent_name));
            }
            log::append_in_conn(
                conn,
                &project_key,
                &EventPayload::AgentHeartbeat(AgentHeartbeat { agent: agent_name }),
                hive_mail_db::now_micros(),
            )?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            hive_mail_db::DbError::NotFound { identifier, .. } => Error::AgentNotFound(identifier),
            other => other.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::in_memory("/proj").unwrap()
    }

    #[tokio::test]
    async fn register_with_explicit_name() {
        let store = test_store();
        let cancel = CancellationToken::new();
        let ctx = init_agent(
            &store,
            &cancel,
            InitAgent {
                agent_name: Some("BlueLake".into()),
                program: "claude-code".into(),
                model: "opus".into(),
                task_description: Some("refactor".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(ctx.agent_name, "BlueLake");
        assert_eq!(ctx.project_key, "/proj");
    }

    #[tokio::test]
    async fn register_generates_valid_name() {
        let store = test_store();
        let cancel = CancellationToken::new();
        let ctx = init_agent(&store, &cancel, InitAgent::default()).await.unwrap();
        assert!(is_valid_agent_name(&ctx.agent_name), "{}", ctx.agent_name);
    }

    #[tokio::test]
    async fn register_rejects_unsalvageable_name() {
        let store = test_store();
        let cancel = CancellationToken::new();
        let err = init_agent(
            &store,
            &cancel,
            InitAgent {
                agent_name: Some("$$$".into()),
                ..InitAgent::default()
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn reregistration_upserts() {
        let store = test_store();
        let cancel = CancellationToken::new();
        let first = InitAgent {
            agent_name: Some("BlueLake".into()),
            program: "claude-code".into(),
            model: "opus".into(),
            task_description: None,
        };
        init_agent(&store, &cancel, first.clone()).await.unwrap();
        let again = InitAgent {
            model: "sonnet".into(),
            ..first
        };
        init_agent(&store, &cancel, again).await.unwrap();

        let agents = crate::admin::list_agents(&store, &cancel).await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].model, "sonnet");
    }

    #[tokio::test]
    async fn heartbeat_requires_registration() {
        let store = test_store();
        let cancel = CancellationToken::new();
        let err = heartbeat(&store, &cancel, "GreenRiver").await.unwrap_err();
        assert!(matches!(err, Error::AgentNotFound(_)));

        init_agent(
            &store,
            &cancel,
            InitAgent {
                agent_name: Some("GreenRiver".into()),
                ..InitAgent::default()
            },
        )
        .await
        .unwrap();
        heartbeat(&store, &cancel, "GreenRiver").await.unwrap();
    }
}
