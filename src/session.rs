// 🗂️ Session - one dataset, one filter state
//
// The session owns the original rows and re-derives the summary from them
// on every change. Ingestion tickets make sure a slow decode that was
// superseded by a newer upload never installs stale rows.

use crate::aggregation::{aggregate, distinct_accounts, Summary, SummaryReport};
use crate::error::{PivotError, Result};
use crate::fields::{FieldBinding, FieldKind};
use crate::filters::FilterState;
use crate::row::Dataset;
use tracing::{info, warn};

/// Handed out when an ingestion starts; only the latest ticket may install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestTicket(u64);

#[derive(Debug, Default)]
pub struct Session {
    dataset: Option<Dataset>,
    filters: FilterState,
    inferred: Option<FieldBinding>,
    latest_ticket: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with a dataset already installed.
    pub fn with_dataset(dataset: Dataset) -> Result<Self> {
        let mut session = Self::new();
        session.install(dataset)?;
        Ok(session)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Replace the dataset wholesale. Filters and inferred columns belong to
    /// the old data and are reset. An empty dataset keeps the previous one.
    pub fn install(&mut self, dataset: Dataset) -> Result<()> {
        if dataset.is_empty() {
            warn!("Source {} has no data rows", dataset.source);
            return Err(PivotError::EmptyDataset);
        }

        info!(
            "Installed dataset {} from {} ({} rows)",
            dataset.id,
            dataset.source,
            dataset.len()
        );
        self.dataset = Some(dataset);
        self.filters.clear();
        self.inferred = None;
        Ok(())
    }

    pub fn begin_ingest(&mut self) -> IngestTicket {
        self.latest_ticket += 1;
        IngestTicket(self.latest_ticket)
    }

    /// Install the outcome of an ingestion started with `ticket`.
    ///
    /// Returns `Ok(false)` when a newer ingestion has started since; the
    /// result (rows or error) is dropped in that case.
    pub fn finish_ingest(&mut self, ticket: IngestTicket, decoded: Result<Dataset>) -> Result<bool> {
        if ticket.0 != self.latest_ticket {
            warn!("Discarding superseded ingestion (ticket {})", ticket.0);
            return Ok(false);
        }

        let dataset = decoded.map_err(|e| match e {
            PivotError::DecodeFailure(_) | PivotError::EmptyDataset => e,
            other => PivotError::DecodeFailure(other.to_string()),
        })?;
        self.install(dataset)?;
        Ok(true)
    }

    // ========================================================================
    // FIELDS
    // ========================================================================

    fn inferred_binding(&mut self) -> Result<&FieldBinding> {
        if self.inferred.is_none() {
            let dataset = self.dataset.as_ref().ok_or(PivotError::NoDataset)?;
            let inferred = match dataset.sample_row() {
                Some(sample) => FieldBinding::infer(sample),
                None => FieldBinding::default(),
            };
            info!(
                "Detected columns: date={:?} amount={:?} account={:?}",
                inferred.date, inferred.amount, inferred.account
            );
            self.inferred = Some(inferred);
        }
        Ok(self.inferred.get_or_insert_with(FieldBinding::default))
    }

    /// Effective columns: manual overrides first, then inference.
    pub fn binding(&mut self) -> Result<FieldBinding> {
        let inferred = self.inferred_binding()?.clone();
        Ok(self.filters.resolve(&inferred))
    }

    pub fn available_fields(&self) -> Vec<String> {
        self.dataset
            .as_ref()
            .map(Dataset::available_fields)
            .unwrap_or_default()
    }

    // ========================================================================
    // AGGREGATION
    // ========================================================================

    /// Aggregate the original rows with the current binding and exclusions.
    pub fn summary(&mut self) -> Result<Summary> {
        let binding = self.binding()?;
        let dataset = self.dataset.as_ref().ok_or(PivotError::NoDataset)?;
        aggregate(dataset.rows(), &binding, self.filters.excluded())
    }

    pub fn report(&mut self) -> Result<SummaryReport> {
        let summary = self.summary()?;
        let id = self.dataset.as_ref().map(|d| d.id);
        Ok(summary.report(id))
    }

    /// Account axis of the unfiltered dataset.
    pub fn all_accounts(&mut self) -> Result<Vec<String>> {
        let binding = self.binding()?;
        let account_field = binding.require(FieldKind::Account)?;
        let dataset = self.dataset.as_ref().ok_or(PivotError::NoDataset)?;
        Ok(distinct_accounts(dataset.rows(), account_field))
    }

    // ========================================================================
    // FILTER MUTATIONS (each one re-aggregates)
    // ========================================================================

    pub fn exclude(&mut self, account: &str) -> Result<Summary> {
        let account = account.trim();
        if !self.filters.is_excluded(account) {
            if !self.all_accounts()?.iter().any(|a| a == account) {
                return Err(PivotError::UnknownAccount(account.to_string()));
            }
            self.filters.exclude(account);
            info!("Excluded account {}", account);
        }
        self.summary()
    }

    pub fn restore(&mut self, account: &str) -> Result<Summary> {
        if self.filters.restore(account.trim()) {
            info!("Restored account {}", account.trim());
        }
        self.summary()
    }

    /// Manual choices are taken verbatim. A name the dataset lacks is only
    /// logged; aggregation reports it as missing values later.
    fn note_absent_column(&self, kind: FieldKind, name: &str) {
        let present = self
            .dataset
            .as_ref()
            .map_or(false, |d| d.available_fields().iter().any(|f| f == name));
        if !present {
            warn!("{} column {:?} is not present in the dataset", kind, name);
        }
    }

    /// Record several manual column choices at once without aggregating.
    /// Used when a caller needs all of them in place before the first summary.
    pub fn apply_overrides(&mut self, overrides: &FieldBinding) {
        for kind in FieldKind::ALL {
            if let Some(name) = overrides.get(kind) {
                self.note_absent_column(kind, name);
                self.filters.set_field_override(kind, Some(name.to_string()));
            }
        }
    }

    /// Pin `kind` to a column of the dataset; `None` (or "") re-enables
    /// auto-detection.
    pub fn set_field_override(&mut self, kind: FieldKind, name: Option<String>) -> Result<Summary> {
        if let Some(column) = name.as_deref().filter(|n| !n.is_empty()) {
            self.note_absent_column(kind, column);
        }
        if self.filters.set_field_override(kind, name) {
            info!(
                "{} column set to {:?}",
                kind,
                self.filters.field_override(kind).unwrap_or("auto-detect")
            );
        }
        self.summary()
    }
}
