//! PNR reconciliation between "master" exports and one "company" export.
//!
//! A [`ComparatorSession`] is an immutable snapshot. Every operation returns a
//! new snapshot and leaves the old one untouched, so sessions can be shared
//! freely and each transition is testable on its own. Loaded data sits behind
//! `Arc`, which keeps snapshots cheap to clone.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::domain::{
    error::{ComparatorError, SheetError},
    headers::{require_header, resolve_header, SheetRule},
    models::{UploadedFile, Workbook},
    ports::WorkbookParser,
};

pub const MASTER_IDENTIFIER: &str = "PNR_NO";
pub const FILTER_COLUMN: &str = "USER_ID";
pub const COMPANY_IDENTIFIER: &str = "PNR/Ticket #";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorPhase {
    Empty,
    MasterLoading,
    MasterReady,
    FilterApplied,
    CompanyLoading,
    CompanyReady,
    Comparing,
    ResultsReady,
}

#[derive(Debug, Clone)]
pub struct ComparatorSettings {
    pub master_sheet: SheetRule,
    pub company_sheet: SheetRule,
    pub max_master_files: usize,
    pub max_file_bytes: usize,
}

/// One row that carried a non-blank identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRow {
    pub key: String,
    pub filter_value: Option<String>,
}

/// Rows of one or more files with their distinct identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub rows: Vec<KeyedRow>,
    /// Distinct identifiers in first-seen order.
    pub unique_keys: Vec<String>,
    pub duplicate_count: usize,
}

impl RecordSet {
    pub fn from_rows(rows: Vec<KeyedRow>) -> Self {
        let unique_keys = first_seen(rows.iter().map(|row| row.key.as_str()));
        let duplicate_count = rows.len() - unique_keys.len();
        Self {
            rows,
            unique_keys,
            duplicate_count,
        }
    }

    pub fn unique_count(&self) -> usize {
        self.unique_keys.len()
    }
}

fn first_seen<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.filter(|key| seen.insert(*key)).map(str::to_string).collect()
}

/// Values of the optional secondary dimension and which are selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDimension {
    values: BTreeSet<String>,
    selected: BTreeSet<String>,
}

impl FilterDimension {
    /// Every value starts selected.
    pub fn new(values: BTreeSet<String>) -> Self {
        Self {
            selected: values.clone(),
            values,
        }
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn all_selected(&self) -> bool {
        self.selected.len() == self.values.len()
    }

    fn toggle(&mut self, value: &str) -> Result<(), ComparatorError> {
        if !self.values.contains(value) {
            return Err(ComparatorError::UnknownFilterValue(value.to_string()));
        }
        if !self.selected.remove(value) {
            self.selected.insert(value.to_string());
        }
        Ok(())
    }

    /// All selected → none; otherwise → all.
    fn toggle_all(&mut self) {
        if self.all_selected() {
            self.selected.clear();
        } else {
            self.selected = self.values.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    /// Filtered master identifiers absent from the company file, in master order.
    pub missing_pnrs: Vec<String>,
    pub master_duplicate_count: usize,
    pub company_duplicate_count: usize,
    pub filtered_unique_count: usize,
    pub selected_filter_count: usize,
}

/// A failed load, with the session reverted to where it stood before.
#[derive(Debug)]
pub struct LoadFailure {
    pub error: ComparatorError,
    pub state: ComparatorSession,
}

#[derive(Debug, Clone)]
pub struct ComparatorSession {
    settings: Arc<ComparatorSettings>,
    phase: ComparatorPhase,
    queued_master: Arc<Vec<UploadedFile>>,
    queued_company: Option<Arc<UploadedFile>>,
    master: Option<Arc<RecordSet>>,
    filter: Option<FilterDimension>,
    company: Option<Arc<RecordSet>>,
    result: Option<Arc<ComparisonResult>>,
}

impl ComparatorSession {
    pub fn new(settings: ComparatorSettings) -> Self {
        Self::with_settings(Arc::new(settings))
    }

    fn with_settings(settings: Arc<ComparatorSettings>) -> Self {
        Self {
            settings,
            phase: ComparatorPhase::Empty,
            queued_master: Arc::new(Vec::new()),
            queued_company: None,
            master: None,
            filter: None,
            company: None,
            result: None,
        }
    }

    pub fn phase(&self) -> ComparatorPhase {
        self.phase
    }

    pub fn master(&self) -> Option<&RecordSet> {
        self.master.as_deref()
    }

    pub fn company(&self) -> Option<&RecordSet> {
        self.company.as_deref()
    }

    pub fn filter(&self) -> Option<&FilterDimension> {
        self.filter.as_ref()
    }

    pub fn has_filter_dimension(&self) -> bool {
        self.filter.is_some()
    }

    pub fn result(&self) -> Option<&ComparisonResult> {
        self.result.as_deref()
    }

    pub fn queued_master_count(&self) -> usize {
        self.queued_master.len()
    }

    pub fn is_parsing(&self) -> bool {
        matches!(self.phase, ComparatorPhase::MasterLoading | ComparatorPhase::CompanyLoading)
    }

    pub fn is_comparing(&self) -> bool {
        self.phase == ComparatorPhase::Comparing
    }

    /// Phase implied by the loaded data alone.
    fn settled_phase(&self) -> ComparatorPhase {
        if self.result.is_some() {
            ComparatorPhase::ResultsReady
        } else if self.company.is_some() {
            ComparatorPhase::CompanyReady
        } else if self.filter.as_ref().is_some_and(|f| !f.all_selected()) {
            ComparatorPhase::FilterApplied
        } else if self.master.is_some() {
            ComparatorPhase::MasterReady
        } else {
            ComparatorPhase::Empty
        }
    }

    fn settled(mut self) -> Self {
        self.phase = self.settled_phase();
        self
    }

    /// Queues master files without parsing them.
    pub fn queue_master_files(&self, files: Vec<UploadedFile>) -> Result<Self, ComparatorError> {
        if files.is_empty() {
            return Err(ComparatorError::NoMasterFiles);
        }
        if files.len() > self.settings.max_master_files {
            warn!("Rejecting {} master files (max {})", files.len(), self.settings.max_master_files);
            return Err(ComparatorError::TooManyFiles {
                count: files.len(),
                limit: self.settings.max_master_files,
            });
        }
        for file in &files {
            self.check_size(file)?;
        }

        debug!("Queued {} master file(s)", files.len());
        let mut next = self.clone();
        next.queued_master = Arc::new(files);
        next.phase = ComparatorPhase::MasterLoading;
        Ok(next)
    }

    /// Parses every queued master file in order and merges them.
    pub fn combine(&self, parser: &dyn WorkbookParser) -> Result<Self, LoadFailure> {
        if self.queued_master.is_empty() {
            return Err(self.fail_master(ComparatorError::NoMasterFiles));
        }
        let parsed: Vec<_> = self.queued_master.iter().map(|file| (file, parser.parse(file))).collect();
        self.merge_master(parsed)
    }

    /// Like [`combine`](Self::combine), but parses up to `concurrency` files
    /// at a time on the blocking pool. The merge itself stays sequential and
    /// in queue order.
    pub async fn combine_concurrently(
        &self,
        parser: Arc<dyn WorkbookParser>,
        concurrency: usize,
    ) -> Result<Self, LoadFailure> {
        if self.queued_master.is_empty() {
            return Err(self.fail_master(ComparatorError::NoMasterFiles));
        }
        let files = Arc::clone(&self.queued_master);

        let joined: Vec<_> = stream::iter(0..files.len())
            .map(|index| {
                let parser = Arc::clone(&parser);
                let files = Arc::clone(&files);
                tokio::task::spawn_blocking(move || parser.parse(&files[index]))
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut outcomes: Vec<Result<Workbook, SheetError>> = Vec::with_capacity(joined.len());
        for outcome in joined {
            match outcome {
                Ok(parsed) => outcomes.push(parsed),
                Err(e) => {
                    error!("Parser task failed: {}", e);
                    return Err(self.fail_master(ComparatorError::Worker(e.to_string())));
                }
            }
        }

        self.merge_master(files.iter().zip(outcomes).collect())
    }

    fn merge_master(&self, parsed: Vec<(&UploadedFile, Result<Workbook, SheetError>)>) -> Result<Self, LoadFailure> {
        let mut rows = Vec::new();
        let mut has_filter_column = false;

        for (file, outcome) in parsed {
            let extracted = outcome.and_then(|workbook| {
                extract_rows(&workbook, &self.settings.master_sheet, MASTER_IDENTIFIER, Some(FILTER_COLUMN))
            });
            match extracted {
                Ok((file_rows, filter_present)) => {
                    debug!("Master file '{}': {} rows", file.file_name, file_rows.len());
                    has_filter_column |= filter_present;
                    rows.extend(file_rows);
                }
                Err(source) => {
                    error!("Failed to load master file '{}': {}", file.file_name, source);
                    return Err(self.fail_master(ComparatorError::File {
                        file: file.file_name.clone(),
                        source,
                    }));
                }
            }
        }

        let values: BTreeSet<String> = rows.iter().filter_map(|row| row.filter_value.clone()).collect();
        let filter = (has_filter_column && !values.is_empty()).then(|| FilterDimension::new(values));
        let master = RecordSet::from_rows(rows);
        info!(
            "✅ Combined {} master file(s): {} rows, {} unique, {} duplicates removed, filter dimension: {}",
            self.queued_master.len(),
            master.rows.len(),
            master.unique_count(),
            master.duplicate_count,
            filter.as_ref().map_or(0, |f| f.values.len())
        );

        let mut next = self.clone();
        next.queued_master = Arc::new(Vec::new());
        next.master = Some(Arc::new(master));
        next.filter = filter;
        next.result = None;
        Ok(next.settled())
    }

    fn fail_master(&self, error: ComparatorError) -> LoadFailure {
        let mut state = self.clone();
        state.queued_master = Arc::new(Vec::new());
        LoadFailure {
            error,
            state: state.settled(),
        }
    }

    pub fn queue_company_file(&self, file: UploadedFile) -> Result<Self, ComparatorError> {
        self.check_size(&file)?;
        debug!("Queued company file '{}'", file.file_name);
        let mut next = self.clone();
        next.queued_company = Some(Arc::new(file));
        next.phase = ComparatorPhase::CompanyLoading;
        Ok(next)
    }

    pub fn load_company(&self, parser: &dyn WorkbookParser) -> Result<Self, LoadFailure> {
        let Some(file) = self.queued_company.clone() else {
            return Err(self.fail_company(ComparatorError::NoCompanyFile));
        };

        let extracted = parser
            .parse(&file)
            .and_then(|workbook| extract_rows(&workbook, &self.settings.company_sheet, COMPANY_IDENTIFIER, None));
        let rows = match extracted {
            Ok((rows, _)) => rows,
            Err(source) => {
                error!("Failed to load company file '{}': {}", file.file_name, source);
                return Err(self.fail_company(ComparatorError::File {
                    file: file.file_name.clone(),
                    source,
                }));
            }
        };

        let company = RecordSet::from_rows(rows);
        info!(
            "✅ Loaded company file '{}': {} unique, {} duplicates removed",
            file.file_name,
            company.unique_count(),
            company.duplicate_count
        );

        let mut next = self.clone();
        next.queued_company = None;
        next.company = Some(Arc::new(company));
        next.result = None;
        Ok(next.settled())
    }

    fn fail_company(&self, error: ComparatorError) -> LoadFailure {
        let mut state = self.clone();
        state.queued_company = None;
        LoadFailure {
            error,
            state: state.settled(),
        }
    }

    pub fn toggle_filter(&self, value: &str) -> Result<Self, ComparatorError> {
        let mut next = self.clone();
        let Some(filter) = next.filter.as_mut() else {
            return Err(ComparatorError::UnknownFilterValue(value.to_string()));
        };
        filter.toggle(value)?;
        next.result = None;
        Ok(next.settled())
    }

    pub fn toggle_all_filters(&self) -> Self {
        let mut next = self.clone();
        if let Some(filter) = next.filter.as_mut() {
            filter.toggle_all();
            next.result = None;
        }
        next.settled()
    }

    /// Enters the busy `Comparing` phase after validating the inputs.
    pub fn begin_compare(&self) -> Result<Self, ComparatorError> {
        self.validate_compare()?;
        let mut next = self.clone();
        next.phase = ComparatorPhase::Comparing;
        Ok(next)
    }

    pub fn compare(&self) -> Result<Self, ComparatorError> {
        let (master, company) = self.validate_compare()?;

        let selected = self.filter.as_ref().map(FilterDimension::selected);
        let filtered_keys = first_seen(
            master
                .rows
                .iter()
                .filter(|row| match selected {
                    None => true,
                    Some(selected) => row.filter_value.as_ref().is_some_and(|v| selected.contains(v)),
                })
                .map(|row| row.key.as_str()),
        );

        let company_keys: HashSet<&str> = company.unique_keys.iter().map(String::as_str).collect();
        let missing_pnrs: Vec<String> = filtered_keys
            .iter()
            .filter(|key| !company_keys.contains(key.as_str()))
            .cloned()
            .collect();

        let result = ComparisonResult {
            missing_pnrs,
            master_duplicate_count: master.duplicate_count,
            company_duplicate_count: company.duplicate_count,
            filtered_unique_count: filtered_keys.len(),
            selected_filter_count: selected.map_or(0, BTreeSet::len),
        };
        info!(
            "✅ Comparison done: {} of {} filtered PNRs missing from company file",
            result.missing_pnrs.len(),
            result.filtered_unique_count
        );

        let mut next = self.clone();
        next.result = Some(Arc::new(result));
        Ok(next.settled())
    }

    fn validate_compare(&self) -> Result<(&RecordSet, &RecordSet), ComparatorError> {
        let (Some(master), Some(company)) = (self.master.as_deref(), self.company.as_deref()) else {
            return Err(ComparatorError::MissingInput);
        };
        if self.filter.as_ref().is_some_and(|f| f.selected.is_empty()) {
            return Err(ComparatorError::NoFilterSelected);
        }
        Ok((master, company))
    }

    pub fn clear_master(&self) -> Self {
        let mut next = self.clone();
        next.queued_master = Arc::new(Vec::new());
        next.master = None;
        next.filter = None;
        next.result = None;
        next.settled()
    }

    pub fn clear_company(&self) -> Self {
        let mut next = self.clone();
        next.queued_company = None;
        next.company = None;
        next.result = None;
        next.settled()
    }

    pub fn clear(&self) -> Self {
        debug!("Resetting comparator session");
        Self::with_settings(Arc::clone(&self.settings))
    }

    fn check_size(&self, file: &UploadedFile) -> Result<(), ComparatorError> {
        let size = file.bytes.len();
        if size > self.settings.max_file_bytes {
            return Err(ComparatorError::File {
                file: file.file_name.clone(),
                source: SheetError::FileTooLarge {
                    size,
                    limit: self.settings.max_file_bytes,
                },
            });
        }
        Ok(())
    }
}

/// Rows with a non-blank identifier, and whether the optional filter column exists.
fn extract_rows(
    workbook: &Workbook,
    rule: &SheetRule,
    identifier: &str,
    filter_column: Option<&str>,
) -> Result<(Vec<KeyedRow>, bool), SheetError> {
    let sheet = rule.locate(workbook)?;
    if sheet.rows.is_empty() {
        warn!("Sheet '{}' has headers but no rows", sheet.name);
        return Err(SheetError::EmptySheet(sheet.name.clone()));
    }
    let identifier_header = require_header(&sheet.headers, identifier, &sheet.name)?;
    let filter_header = match filter_column {
        Some(column) => resolve_header(&sheet.headers, column, &sheet.name)?,
        None => None,
    };

    let rows = sheet
        .rows
        .iter()
        .filter_map(|row| {
            let key = row.text(identifier_header);
            if key.is_empty() {
                return None;
            }
            let filter_value = filter_header.map(|h| row.text(h)).filter(|v| !v.is_empty());
            Some(KeyedRow { key, filter_value })
        })
        .collect();

    Ok((rows, filter_header.is_some()))
}
