//! Advisory file reservation operations
//!
//! Cooperative locks: a reserve call always grants every requested path and
//! reports overlapping claims by other agents as advisory conflicts. The
//! substrate reports; the caller decides.

use hive_mail_core::events::{EventPayload, FileReleased, FileReserved};
use hive_mail_core::pattern_overlap::CompiledPattern;
use hive_mail_core::{Error, Result};
use hive_mail_db::{Applied, Store, log, micros_to_iso, now_micros, queries};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Reserve request.
///
/// `exclusive` defaults to true, `ttl_seconds` to the store's configured
/// default. `force` is accepted and ignored, reserved for a future
/// pre-emption policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ReserveFiles {
    pub agent: String,
    pub paths: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

const fn default_exclusive() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantedReservation {
    pub id: i64,
    pub path: String,
    pub exclusive: bool,
    pub expires_at: String,
}

/// An advisory overlap: `path` from the request against a `pattern` held by
/// `holder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConflict {
    pub path: String,
    pub holder: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveFilesResponse {
    pub granted: Vec<GrantedReservation>,
    pub conflicts: Vec<ReservationConflict>,
}

/// Release request: by id set, by path set, or (with neither) every active
/// reservation the agent holds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseFiles {
    pub agent: String,
    #[serde(default)]
    pub paths: Option<Vec<String>>,
    #[serde(default)]
    pub reservation_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseFilesResponse {
    pub released: usize,
    pub released_at: String,
}

/// Active reservation as listed back to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationView {
    pub id: i64,
    pub agent: String,
    pub path_pattern: String,
    pub exclusive: bool,
    pub reason: String,
    pub created_at: String,
    pub expires_at: String,
}

/// Patterns that claim the whole tree; almost always broader than intended.
fn is_suspicious_pattern(pattern: &str) -> bool {
    matches!(pattern.trim(), "*" | "**" | "**/*" | "/" | ".")
}

/// Reserve path patterns for an agent, emitting `file_reserved`.
///
/// Conflicts against the currently active set are computed in the same
/// transaction as the grant, so the warning list is consistent with the
/// state the reservation landed in. Overlap requires the patterns to
/// intersect and at least one side to be exclusive.
pub async fn reserve_files(
    store: &Store,
    cancel: &CancellationToken,
    req: ReserveFiles,
) -> Result<ReserveFilesResponse> {
    if req.paths.is_empty() {
        return Err(Error::MissingField("paths".into()));
    }
    if req.paths.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::invalid("paths must not contain blank entries"));
    }
    let ttl_seconds = req
        .ttl_seconds
        .unwrap_or(store.config().default_ttl_seconds);
    if ttl_seconds <= 0 {
        return Err(Error::invalid(format!(
            "ttl_seconds must be positive, got {ttl_seconds}"
        )));
    }
    if req.force {
        tracing::debug!("force=true accepted but has no effect");
    }
    for path in &req.paths {
        if is_suspicious_pattern(path) {
            tracing::warn!(pattern = %path, "reservation claims the entire project tree");
        }
    }

    let project_key = store.project_key().to_string();
    let ReserveFiles {
        agent,
        paths,
        reason,
        exclusive,
        ..
    } = req;
    let reason = reason.unwrap_or_default();
    let grant_paths = paths.clone();

    let (ids, conflicts, expires_ts) = store
        .db()
        .transaction(cancel, move |conn| {
            let now = now_micros();
            let active = queries::active_reservations(conn, &project_key, now)?;

            let mut conflicts = Vec::new();
            for path in &paths {
                let requested = CompiledPattern::new(path);
                for held in &active {
                    if held.agent_name == agent {
                        continue;
                    }
                    if !exclusive && !held.exclusive {
                        continue;
                    }
                    if requested.overlaps(&CompiledPattern::new(&held.path_pattern)) {
                        conflicts.push(ReservationConflict {
                            path: path.clone(),
                            holder: held.agent_name.clone(),
                            pattern: held.path_pattern.clone(),
                        });
                    }
                }
            }
            conflicts.sort_by(|a, b| {
                a.path
                    .cmp(&b.path)
                    .then_with(|| a.holder.cmp(&b.holder))
                    .then_with(|| a.pattern.cmp(&b.pattern))
            });

            let payload = EventPayload::FileReserved(FileReserved {
                agent,
                paths,
                exclusive,
                reason,
                ttl_seconds,
            });
            let outcome = log::append_in_conn(conn, &project_key, &payload, now)?;
            let Applied::ReservationIds(ids) = outcome.applied else {
                return Err(hive_mail_db::DbError::Internal(
                    "reserve did not assign reservation ids".into(),
                ));
            };

            let expires_ts = now.saturating_add(ttl_seconds.saturating_mul(1_000_000));
            Ok((ids, conflicts, expires_ts))
        })
        .await?;

    if !conflicts.is_empty() {
        tracing::info!(
            count = conflicts.len(),
            "reservation granted with advisory conflicts"
        );
    }

    let expires_at = micros_to_iso(expires_ts);
    let granted = ids
        .into_iter()
        .zip(grant_paths)
        .map(|(id, path)| GrantedReservation {
            id,
            path,
            exclusive,
            expires_at: expires_at.clone(),
        })
        .collect();
    Ok(ReserveFilesResponse { granted, conflicts })
}

/// Release reservations held by an agent, emitting `file_released`.
///
/// Matching zero rows is not an error, and the event is still appended for
/// audit continuity.
pub async fn release_files(
    store: &Store,
    cancel: &CancellationToken,
    req: ReleaseFiles,
) -> Result<ReleaseFilesResponse> {
    let payload = EventPayload::FileReleased(FileReleased {
        agent: req.agent,
        paths: req.paths,
        reservation_ids: req.reservation_ids,
    });
    let outcome = log::append_event(store.db(), cancel, store.project_key(), payload).await?;
    let Applied::ReleasedCount(released) = outcome.applied else {
        return Err(Error::Storage("release did not report a row count".into()));
    };

    Ok(ReleaseFilesResponse {
        released,
        released_at: micros_to_iso(outcome.occurred_at),
    })
}

/// List currently active reservations in the project.
pub async fn list_reservations(
    store: &Store,
    cancel: &CancellationToken,
) -> Result<Vec<ReservationView>> {
    let project_key = store.project_key().to_string();
    let reservations = store
        .db()
        .with_conn(cancel, move |conn| {
            queries::active_reservations(conn, &project_key, now_micros())
        })
        .await?;

    Ok(reservations
        .into_iter()
        .map(|r| ReservationView {
            id: r.id.unwrap_or_default(),
            agent: r.agent_name,
            path_pattern: r.path_pattern,
            exclusive: r.exclusive,
            reason: r.reason,
            created_at: micros_to_iso(r.created_ts),
            expires_at: micros_to_iso(r.expires_ts),
        })
        .collect())
}
