//! SQL migration definitions for the run journal.
//!
//! Migrations are applied in order on open. Each one records its version in
//! `schema_migrations` as its final statement.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, row_outcomes",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per classification run
CREATE TABLE IF NOT EXISTS runs (
    id           TEXT PRIMARY KEY,
    topic        TEXT NOT NULL,
    profile_hash TEXT NOT NULL,
    sheet        TEXT NOT NULL,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    status       TEXT NOT NULL DEFAULT 'running',
    abort_reason TEXT,
    examined     INTEGER NOT NULL DEFAULT 0,
    classified   INTEGER NOT NULL DEFAULT 0,
    skipped      INTEGER NOT NULL DEFAULT 0,
    errored      INTEGER NOT NULL DEFAULT 0,
    no_results   INTEGER NOT NULL DEFAULT 0,
    config_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);

-- Per-row outcomes, appended as the run progresses
CREATE TABLE IF NOT EXISTS row_outcomes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id      TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
    row_number  INTEGER NOT NULL,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    verdict     INTEGER,
    evidence    TEXT,
    no_results  INTEGER NOT NULL DEFAULT 0,
    error       TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_row_outcomes_run_id ON row_outcomes(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
