//! Run controller: walks the sheet, applies skip and cap policy, classifies
//! and writes back one row at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use orgscan_search::SearchProvider;
use orgscan_sheets::{ColumnLayout, SheetStore};
use orgscan_shared::{
    OrgScanError, OutcomeKind, Result, Row, RowOutcome, RunConfig, RunStatus, RunSummary,
    TopicProfile,
};
use orgscan_storage::Journal;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::{Classification, RowClassifier};

/// Progress callback for reporting run status.
pub trait RunReporter: Send + Sync {
    /// Called once the rows are loaded.
    fn started(&self, topic: &str, rows: usize);
    /// Called before a row is skipped or classified.
    fn row_started(&self, row: &Row);
    /// Called before a provider call is retried.
    fn retrying(&self, row: &Row, attempt: u32, error: &OrgScanError);
    /// Called after a row's outcome is settled.
    fn row_finished(&self, outcome: &RowOutcome);
    /// Called when the run ends, aborted or not.
    fn done(&self, summary: &RunSummary);
}

/// No-op reporter for headless/test usage.
pub struct SilentReporter;

impl RunReporter for SilentReporter {
    fn started(&self, _topic: &str, _rows: usize) {}
    fn row_started(&self, _row: &Row) {}
    fn retrying(&self, _row: &Row, _attempt: u32, _error: &OrgScanError) {}
    fn row_finished(&self, _outcome: &RowOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Counters scoped to one invocation.
#[derive(Debug, Default)]
struct RunState {
    examined: usize,
    classified: usize,
    skipped: usize,
    errored: usize,
    no_results: usize,
    outcomes: Vec<RowOutcome>,
}

impl RunState {
    /// Which cap, if any, says to stop before the next row.
    fn cap_reached(&self, config: &RunConfig) -> Option<&'static str> {
        if config.max_rows_examined.is_some_and(|cap| self.examined >= cap) {
            return Some("max_rows_examined");
        }
        if config.max_new_rows.is_some_and(|cap| self.classified >= cap) {
            return Some("max_new_rows");
        }
        None
    }

    fn push(&mut self, outcome: RowOutcome) {
        self.examined += 1;
        match &outcome.kind {
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Classified { no_results, .. } => {
                self.classified += 1;
                if *no_results {
                    self.no_results += 1;
                }
            }
            OutcomeKind::Failed { .. } => self.errored += 1,
        }
        self.outcomes.push(outcome);
    }

    fn into_summary(self, status: RunStatus, start: Instant) -> RunSummary {
        RunSummary {
            status,
            examined: self.examined,
            classified: self.classified,
            skipped: self.skipped,
            errored: self.errored,
            no_results: self.no_results,
            outcomes: self.outcomes,
            elapsed: start.elapsed(),
        }
    }
}

/// Drives one classification run over a sheet.
pub struct RunController<'a> {
    provider: &'a dyn SearchProvider,
    sheet: &'a dyn SheetStore,
    profile: &'a TopicProfile,
    layout: ColumnLayout,
    config: &'a RunConfig,
    journal: Option<&'a Journal>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> RunController<'a> {
    pub fn new(
        provider: &'a dyn SearchProvider,
        sheet: &'a dyn SheetStore,
        profile: &'a TopicProfile,
        name_column: &str,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            provider,
            sheet,
            profile,
            layout: ColumnLayout::for_topic(name_column, profile),
            config,
            journal: None,
            cancel: None,
        }
    }

    /// Append every outcome to `journal` as it happens.
    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Abort with "interrupted" once `flag` is set; checked between rows.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Run to completion.
    ///
    /// Setup failures (columns, reading rows) are returned as errors. Once
    /// rows are being processed, fatal conditions end the run with
    /// [`RunStatus::Aborted`] and everything written so far stays written.
    #[instrument(skip_all, fields(topic = %self.profile.name, sheet = %self.sheet.describe()))]
    pub async fn run(&self, reporter: &dyn RunReporter) -> Result<RunSummary> {
        let start = Instant::now();

        self.sheet
            .ensure_columns(&self.layout.result_columns())
            .await?;
        let rows = self.sheet.read_rows(&self.layout).await?;
        info!(rows = rows.len(), "starting run");
        reporter.started(&self.profile.name, rows.len());

        let run_id = self.journal_begin().await;
        let classifier = RowClassifier::new(self.provider, self.profile, self.config);
        let mut state = RunState::default();
        let mut status = RunStatus::Done;

        for row in &rows {
            if let Some(cap) = state.cap_reached(self.config) {
                info!(cap, examined = state.examined, classified = state.classified, "cap reached");
                break;
            }
            if self.cancelled() {
                warn!(row = row.number, "run interrupted");
                status = RunStatus::Aborted {
                    reason: "interrupted".into(),
                };
                break;
            }

            reporter.row_started(row);

            if self.config.skip_existing && row.verdict.is_filled() {
                debug!(row = row.number, name = %row.name, "already classified, skipping");
                let outcome = RowOutcome {
                    row: row.number,
                    name: row.name.clone(),
                    kind: OutcomeKind::Skipped,
                };
                self.settle(&mut state, outcome, run_id.as_deref(), reporter)
                    .await;
                continue;
            }

            let classification = match self.classify_with_retry(&classifier, row, reporter).await {
                Ok(c) => c,
                Err(e) => {
                    let fatal = e.is_fatal();
                    if fatal {
                        error!(row = row.number, error = %e, "fatal search error");
                    } else {
                        warn!(row = row.number, error = %e, "search failed, continuing");
                    }
                    let outcome = RowOutcome {
                        row: row.number,
                        name: row.name.clone(),
                        kind: OutcomeKind::Failed {
                            error: e.to_string(),
                        },
                    };
                    self.settle(&mut state, outcome, run_id.as_deref(), reporter)
                        .await;
                    if fatal {
                        status = RunStatus::Aborted {
                            reason: e.to_string(),
                        };
                        break;
                    }
                    continue;
                }
            };

            let write = self
                .sheet
                .write_result(
                    row.number,
                    &self.layout,
                    classification.verdict(),
                    classification.evidence(),
                )
                .await;
            if let Err(e) = write {
                error!(row = row.number, error = %e, "sheet write failed");
                status = RunStatus::Aborted {
                    reason: format!("row {}: {e}", row.number),
                };
                break;
            }

            info!(
                row = row.number,
                name = %row.name,
                verdict = classification.verdict(),
                evidence = classification.evidence().unwrap_or(""),
                "row classified"
            );
            let outcome = RowOutcome {
                row: row.number,
                name: row.name.clone(),
                kind: OutcomeKind::Classified {
                    verdict: classification.verdict(),
                    evidence: classification.evidence().map(str::to_string),
                    no_results: classification.is_no_results(),
                },
            };
            self.settle(&mut state, outcome, run_id.as_deref(), reporter)
                .await;
        }

        let summary = state.into_summary(status, start);
        info!(
            status = summary.status.label(),
            examined = summary.examined,
            classified = summary.classified,
            skipped = summary.skipped,
            errored = summary.errored,
            no_results = summary.no_results,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run finished"
        );

        if let (Some(journal), Some(id)) = (self.journal, run_id.as_deref()) {
            if let Err(e) = journal.finish_run(id, &summary).await {
                warn!(error = %e, "failed to finish journal run");
            }
        }
        reporter.done(&summary);
        Ok(summary)
    }

    /// Classify one row, retrying provider errors with doubling backoff.
    async fn classify_with_retry(
        &self,
        classifier: &RowClassifier<'_>,
        row: &Row,
        reporter: &dyn RunReporter,
    ) -> Result<Classification> {
        let mut attempt = 0;
        let mut backoff = self.config.retry_backoff;
        loop {
            match classifier.classify(&row.name).await {
                Err(e @ OrgScanError::Provider(_)) if attempt < self.config.provider_retries => {
                    attempt += 1;
                    warn!(
                        row = row.number,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying search"
                    );
                    reporter.retrying(row, attempt, &e);
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    /// Count an outcome, journal it and report it.
    async fn settle(
        &self,
        state: &mut RunState,
        outcome: RowOutcome,
        run_id: Option<&str>,
        reporter: &dyn RunReporter,
    ) {
        if let (Some(journal), Some(id)) = (self.journal, run_id) {
            if let Err(e) = journal.record_outcome(id, &outcome).await {
                warn!(row = outcome.row, error = %e, "failed to journal outcome");
            }
        }
        reporter.row_finished(&outcome);
        state.push(outcome);
    }

    async fn journal_begin(&self) -> Option<String> {
        let journal = self.journal?;
        let config_json = serde_json::json!({
            "skip_existing": self.config.skip_existing,
            "max_rows_examined": self.config.max_rows_examined,
            "max_new_rows": self.config.max_new_rows,
            "result_count": self.config.result_count,
            "request_delay_secs": self.config.request_delay.as_secs_f64(),
            "provider_retries": self.config.provider_retries,
            "locale": self.config.locale,
            "time_window": self.config.time_window,
            "name_column": self.layout.name_column,
        })
        .to_string();

        match journal
            .begin_run(self.profile, &self.sheet.describe(), Some(&config_json))
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "journal unavailable, continuing without it");
                None
            }
        }
    }
}
