//! libSQL run journal.
//!
//! The [`Journal`] records every classification run and the outcome of each
//! row it examined, so a sheet can be audited after the fact.
//!
//! **Access rules:**
//! - `orgscan run`: read-write via [`Journal::open`]
//! - `orgscan history`: read-only via [`Journal::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use orgscan_shared::{OrgScanError, OutcomeKind, Result, RowOutcome, RunSummary, TopicProfile};
use serde::Serialize;
use uuid::Uuid;

/// One journaled run, as listed by `orgscan history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub topic: String,
    pub profile_hash: String,
    pub sheet: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `running`, `done` or `aborted`.
    pub status: String,
    pub abort_reason: Option<String>,
    pub examined: usize,
    pub classified: usize,
    pub skipped: usize,
    pub errored: usize,
    pub no_results: usize,
}

/// Journal handle wrapping a libSQL database.
pub struct Journal {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> OrgScanError {
    OrgScanError::Storage(e.to_string())
}

impl Journal {
    /// Open or create a journal at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OrgScanError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let journal = Self {
            db,
            conn,
            readonly: false,
        };
        journal.run_migrations().await?;
        Ok(journal)
    }

    /// Open an existing journal at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OrgScanError::Storage(format!(
                "no journal at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying journal migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        OrgScanError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(OrgScanError::Storage(
                "journal is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Record the start of a run and return its id.
    pub async fn begin_run(
        &self,
        topic: &TopicProfile,
        sheet: &str,
        config_json: Option<&str>,
    ) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, topic, profile_hash, sheet, started_at, config_json) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    topic.name.as_str(),
                    topic.fingerprint(),
                    sheet,
                    now.as_str(),
                    config_json
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(run_id = %id, topic = %topic.name, "journal run started");
        Ok(id)
    }

    /// Append one row outcome to a run.
    pub async fn record_outcome(&self, run_id: &str, outcome: &RowOutcome) -> Result<()> {
        self.check_writable()?;
        let (kind, verdict, evidence, no_results, error) = match &outcome.kind {
            OutcomeKind::Skipped => ("skipped", None, None, false, None),
            OutcomeKind::Classified {
                verdict,
                evidence,
                no_results,
            } => (
                "classified",
                Some(i64::from(*verdict)),
                evidence.as_deref(),
                *no_results,
                None,
            ),
            OutcomeKind::Failed { error } => ("failed", None, None, false, Some(error.as_str())),
        };

        self.conn
            .execute(
                "INSERT INTO row_outcomes \
                 (run_id, row_number, name, kind, verdict, evidence, no_results, error, recorded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run_id,
                    outcome.row as i64,
                    outcome.name.as_str(),
                    kind,
                    verdict,
                    evidence,
                    i64::from(no_results),
                    error,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Close out a run with its final status and counters.
    pub async fn finish_run(&self, run_id: &str, summary: &RunSummary) -> Result<()> {
        self.check_writable()?;
        let reason = match &summary.status {
            orgscan_shared::RunStatus::Aborted { reason } => Some(reason.as_str()),
            orgscan_shared::RunStatus::Done => None,
        };
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, status = ?2, abort_reason = ?3, \
                 examined = ?4, classified = ?5, skipped = ?6, errored = ?7, no_results = ?8 \
                 WHERE id = ?9",
                params![
                    Utc::now().to_rfc3339(),
                    summary.status.label(),
                    reason,
                    summary.examined as i64,
                    summary.classified as i64,
                    summary.skipped as i64,
                    summary.errored as i64,
                    summary.no_results as i64,
                    run_id
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(run_id, status = summary.status.label(), "journal run finished");
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic, profile_hash, sheet, started_at, finished_at, status, \
                 abort_reason, examined, classified, skipped, errored, no_results \
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_run_record(&row)?);
        }
        Ok(results)
    }

    /// Look up a single run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, topic, profile_hash, sheet, started_at, finished_at, status, \
                 abort_reason, examined, classified, skipped, errored, no_results \
                 FROM runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_run_record(&row)?)),
            None => Ok(None),
        }
    }

    /// Outcomes of one run in the order they were recorded.
    pub async fn outcomes_for_run(&self, run_id: &str) -> Result<Vec<RowOutcome>> {
        let mut rows = self
            .conn
            .query(
                "SELECT row_number, name, kind, verdict, evidence, no_results, error \
                 FROM row_outcomes WHERE run_id = ?1 ORDER BY id",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let kind: String = row.get(2).map_err(storage_err)?;
            let kind = match kind.as_str() {
                "skipped" => OutcomeKind::Skipped,
                "classified" => OutcomeKind::Classified {
                    verdict: row.get::<i64>(3).map_err(storage_err)? != 0,
                    evidence: row.get::<String>(4).ok(),
                    no_results: row.get::<i64>(5).unwrap_or(0) != 0,
                },
                "failed" => OutcomeKind::Failed {
                    error: row.get::<String>(6).unwrap_or_default(),
                },
                other => {
                    return Err(OrgScanError::Storage(format!(
                        "unknown outcome kind '{other}'"
                    )));
                }
            };
            results.push(RowOutcome {
                row: row.get::<i64>(0).map_err(storage_err)? as usize,
                name: row.get::<String>(1).map_err(storage_err)?,
                kind,
            });
        }
        Ok(results)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrgScanError::Storage(format!("invalid date: {e}")))
}

fn row_to_run_record(row: &libsql::Row) -> Result<RunRecord> {
    let started: String = row.get(4).map_err(storage_err)?;
    let finished_at = match row.get::<String>(5).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };
    let count = |i: i32| row.get::<i64>(i).map(|v| v as usize).map_err(storage_err);

    Ok(RunRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        topic: row.get::<String>(1).map_err(storage_err)?,
        profile_hash: row.get::<String>(2).map_err(storage_err)?,
        sheet: row.get::<String>(3).map_err(storage_err)?,
        started_at: parse_timestamp(&started)?,
        finished_at,
        status: row.get::<String>(6).map_err(storage_err)?,
        abort_reason: row.get::<String>(7).ok(),
        examined: count(8)?,
        classified: count(9)?,
        skipped: count(10)?,
        errored: count(11)?,
        no_results: count(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgscan_shared::{RunStatus, topics};
    use std::time::Duration;

    async fn test_journal() -> (Journal, std::path::PathBuf) {
        let tmp = std::env::temp_dir().join(format!("orgscan_test_{}.db", Uuid::now_v7()));
        let journal = Journal::open(&tmp).await.expect("open test journal");
        (journal, tmp)
    }

    fn summary(status: RunStatus, outcomes: Vec<RowOutcome>) -> RunSummary {
        RunSummary {
            status,
            examined: outcomes.len(),
            classified: 1,
            skipped: 1,
            errored: 1,
            no_results: 0,
            outcomes,
            elapsed: Duration::from_secs(3),
        }
    }

    fn sample_outcomes() -> Vec<RowOutcome> {
        vec![
            RowOutcome {
                row: 2,
                name: "Acme Cooperative".into(),
                kind: OutcomeKind::Skipped,
            },
            RowOutcome {
                row: 3,
                name: "Beta Energy".into(),
                kind: OutcomeKind::Classified {
                    verdict: true,
                    evidence: Some("https://beta.example/drones".into()),
                    no_results: false,
                },
            },
            RowOutcome {
                row: 4,
                name: "Gamma Co".into(),
                kind: OutcomeKind::Failed {
                    error: "provider error: HTTP 500".into(),
                },
            },
        ]
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let (journal, _) = test_journal().await;
        assert_eq!(journal.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let (journal, path) = test_journal().await;
        drop(journal);
        let journal = Journal::open(&path).await.expect("reopen");
        assert_eq!(journal.schema_version().await, 1);
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let (journal, _) = test_journal().await;
        let topic = topics::drone_inspection();
        let run_id = journal
            .begin_run(&topic, "orgs.csv", Some("{}"))
            .await
            .unwrap();

        let started = journal.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(started.status, "running");
        assert!(started.finished_at.is_none());
        assert_eq!(started.profile_hash, topic.fingerprint());

        for outcome in sample_outcomes() {
            journal.record_outcome(&run_id, &outcome).await.unwrap();
        }
        journal
            .finish_run(&run_id, &summary(RunStatus::Done, sample_outcomes()))
            .await
            .unwrap();

        let finished = journal.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(finished.status, "done");
        assert!(finished.finished_at.is_some());
        assert_eq!(finished.examined, 3);
        assert_eq!(finished.errored, 1);
        assert!(finished.abort_reason.is_none());
    }

    #[tokio::test]
    async fn outcomes_round_trip_in_order() {
        let (journal, _) = test_journal().await;
        let run_id = journal
            .begin_run(&topics::vegetation(), "orgs.csv", None)
            .await
            .unwrap();
        for outcome in sample_outcomes() {
            journal.record_outcome(&run_id, &outcome).await.unwrap();
        }

        let stored = journal.outcomes_for_run(&run_id).await.unwrap();
        assert_eq!(stored, sample_outcomes());
    }

    #[tokio::test]
    async fn aborted_run_keeps_reason() {
        let (journal, _) = test_journal().await;
        let run_id = journal
            .begin_run(&topics::vegetation(), "sheet", None)
            .await
            .unwrap();
        let status = RunStatus::Aborted {
            reason: "authentication failed".into(),
        };
        journal
            .finish_run(&run_id, &summary(status, Vec::new()))
            .await
            .unwrap();

        let record = journal.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(record.status, "aborted");
        assert_eq!(record.abort_reason.as_deref(), Some("authentication failed"));
    }

    #[tokio::test]
    async fn list_runs_newest_first_with_limit() {
        let (journal, _) = test_journal().await;
        let topic = topics::vegetation();
        let first = journal.begin_run(&topic, "a", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = journal.begin_run(&topic, "b", None).await.unwrap();

        let runs = journal.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);

        let runs = journal.list_runs(1).await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let (journal, path) = test_journal().await;
        drop(journal);
        let ro = Journal::open_readonly(&path).await.unwrap();
        let err = ro
            .begin_run(&topics::vegetation(), "x", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert!(ro.list_runs(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let missing = std::env::temp_dir().join(format!("orgscan_missing_{}.db", Uuid::now_v7()));
        assert!(Journal::open_readonly(&missing).await.is_err());
    }

    #[tokio::test]
    async fn unknown_run_is_none() {
        let (journal, _) = test_journal().await;
        assert!(journal.get_run("nope").await.unwrap().is_none());
        assert!(journal.outcomes_for_run("nope").await.unwrap().is_empty());
    }
}
