//! Record view engine.
//!
//! Turns the raw snapshot of confirmations into the page shown to the admin.
//! The pipeline is filter → sort → paginate and is re-run from scratch with
//! [`apply`] after every state transition. Stages work on a row mapping
//! (indices into the snapshot) instead of cloning records.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::record::{AttendanceFilter, Record, SortKey};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const PAGE_WINDOW: usize = 5;

/// Everything the admin can change about the view.
///
/// Transitions consume the state and return the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub search_text: String,
    pub attendance_filter: AttendanceFilter,
    pub sort_key: SortKey,
    pub sort_ascending: bool,
    pub page_index: usize, // 1-based
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            search_text: String::new(),
            attendance_filter: AttendanceFilter::ATTENDING,
            sort_key: SortKey::NAME,
            sort_ascending: true,
            page_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ViewState {
    pub fn with_page_size_default(page_size: usize) -> Self {
        ViewState::default().with_page_size(page_size)
    }

    pub fn with_search(self, text: impl Into<String>) -> Self {
        ViewState {
            search_text: text.into(),
            page_index: 1,
            ..self
        }
    }

    pub fn with_attendance_filter(self, filter: AttendanceFilter) -> Self {
        ViewState {
            attendance_filter: filter,
            page_index: 1,
            ..self
        }
    }

    pub fn with_sort_key(self, key: SortKey) -> Self {
        ViewState {
            sort_key: key,
            page_index: 1,
            ..self
        }
    }

    /// Same key flips the direction, a new key starts ascending. Keeps the page.
    pub fn toggle_sort(self, key: SortKey) -> Self {
        if self.sort_key == key {
            ViewState {
                sort_ascending: !self.sort_ascending,
                ..self
            }
        } else {
            ViewState {
                sort_key: key,
                sort_ascending: true,
                ..self
            }
        }
    }

    pub fn with_page_size(self, page_size: usize) -> Self {
        if page_size == 0 {
            return self;
        }
        ViewState {
            page_size,
            page_index: 1,
            ..self
        }
    }

    /// Out of range requests are ignored, the page is never clamped.
    pub fn go_to_page(self, page: usize, page_count: usize) -> Self {
        if page >= 1 && page <= page_count {
            ViewState {
                page_index: page,
                ..self
            }
        } else {
            self
        }
    }

    pub fn next_page(self, page_count: usize) -> Self {
        if self.page_index < page_count {
            let page = self.page_index + 1;
            ViewState {
                page_index: page,
                ..self
            }
        } else {
            self
        }
    }

    pub fn previous_page(self) -> Self {
        if self.page_index > 1 {
            let page = self.page_index - 1;
            ViewState {
                page_index: page,
                ..self
            }
        } else {
            self
        }
    }
}

/// Derived output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    /// State actually used for slicing, after stale page healing.
    pub state: ViewState,
    /// Filtered and sorted row mapping into the snapshot.
    pub rows: Arc<Vec<usize>>,
    pub page_count: usize,
    /// Row mapping of the current page.
    pub page: Vec<usize>,
}

impl View {
    pub fn empty(state: ViewState) -> Self {
        View {
            state,
            rows: Arc::new(Vec::new()),
            page_count: 0,
            page: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub attending_people: u64,
    pub confirmed: usize,
    pub declined: usize,
}

impl Totals {
    /// Counts over the whole snapshot, filters never apply here.
    pub fn from_records(records: &[Record]) -> Self {
        records.iter().fold(Totals::default(), |mut t, r| {
            if r.attending {
                t.attending_people += u64::from(r.party_size);
                t.confirmed += 1;
            } else {
                t.declined += 1;
            }
            t
        })
    }
}

// Return snapshot indices of records matching both the attendance filter and the search text
pub fn filter_rows(records: &[Record], filter: AttendanceFilter, search_text: &str) -> Vec<usize> {
    let needle = search_text.to_lowercase();
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| filter.matches(r))
        .filter(|(_, r)| needle.is_empty() || r.name.to_lowercase().contains(&needle))
        .map(|(idx, _)| idx)
        .collect()
}

pub fn sort_rows(records: &[Record], mut rows: Vec<usize>, key: SortKey, ascending: bool) -> Vec<usize> {
    // sort_by is stable, equal keys keep their filtered order in both directions
    rows.sort_by(|&a, &b| {
        let ordering = key.compare(&records[a], &records[b]);
        if ascending { ordering } else { ordering.reverse() }
    });
    rows
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

pub fn paginate(rows: &[usize], page_index: usize, page_size: usize) -> &[usize] {
    let begin = page_index.saturating_sub(1).saturating_mul(page_size);
    let end = std::cmp::min(begin.saturating_add(page_size), rows.len());
    if begin >= end {
        return &[];
    }
    &rows[begin..end]
}

/// Runs the full pipeline for `state` over `records`.
pub fn apply(state: &ViewState, records: &[Record]) -> View {
    let filtered = filter_rows(records, state.attendance_filter, &state.search_text);
    let rows = sort_rows(records, filtered, state.sort_key, state.sort_ascending);
    let page_count = page_count(rows.len(), state.page_size);

    let mut state = state.clone();
    // A narrower result set can leave the page index behind, start over
    if state.page_index == 0 || (state.page_index > page_count && page_count > 0) {
        debug!(
            "Page {} is beyond {} pages, resetting to the first page",
            state.page_index, page_count
        );
        state.page_index = 1;
    }

    let page = paginate(&rows, state.page_index, state.page_size).to_vec();
    trace!(
        "Pipeline: filter {:?}, search {:?}, sort {:?} asc:{}, rows {}, page {}/{}",
        state.attendance_filter,
        state.search_text,
        state.sort_key,
        state.sort_ascending,
        rows.len(),
        state.page_index,
        page_count
    );

    View {
        state,
        rows: Arc::new(rows),
        page_count,
        page,
    }
}

/// Up to five page numbers centered on the current page.
pub fn page_window(page_index: usize, page_count: usize) -> Vec<usize> {
    let half = PAGE_WINDOW / 2;
    let mut start = std::cmp::max(1, page_index.saturating_sub(half));
    let end = std::cmp::min(page_count, start + PAGE_WINDOW - 1);

    // Close to the end, slide the window back so it stays full
    if end < start + PAGE_WINDOW - 1 {
        start = std::cmp::max(1, end.saturating_sub(PAGE_WINDOW - 1));
    }
    (start..=end).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// Owns the snapshot, the view state and the last derived view.
pub struct ViewEngine {
    records: Arc<Vec<Record>>,
    state: ViewState,
    view: View,
    load_state: LoadState,
}

impl ViewEngine {
    pub fn new(state: ViewState) -> Self {
        ViewEngine {
            records: Arc::new(Vec::new()),
            view: View::empty(state.clone()),
            state,
            load_state: LoadState::Loading,
        }
    }

    // -------------------- Snapshot lifecycle ---------------------- //

    /// No partial data is exposed while a fetch is outstanding.
    pub fn begin_loading(&mut self) {
        self.load_state = LoadState::Loading;
        self.view = View::empty(self.state.clone());
    }

    /// Replaces the snapshot wholesale.
    pub fn load(&mut self, records: Vec<Record>) {
        debug!("Loaded snapshot with {} records", records.len());
        self.records = Arc::new(records);
        self.load_state = LoadState::Ready;
        self.refresh();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.records = Arc::new(Vec::new());
        self.load_state = LoadState::Failed(message.into());
        self.refresh();
    }

    // -------------------- State transitions ---------------------- //

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.transition(|s| s.with_search(text));
    }

    pub fn set_attendance_filter(&mut self, filter: AttendanceFilter) {
        self.transition(|s| s.with_attendance_filter(filter));
    }

    pub fn set_sort_key(&mut self, key: SortKey) {
        self.transition(|s| s.with_sort_key(key));
    }

    pub fn toggle_sort(&mut self, key: SortKey) {
        self.transition(|s| s.toggle_sort(key));
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.transition(|s| s.with_page_size(page_size));
    }

    pub fn go_to_page(&mut self, page: usize) {
        let page_count = self.view.page_count;
        self.transition(|s| s.go_to_page(page, page_count));
    }

    pub fn next_page(&mut self) {
        let page_count = self.view.page_count;
        self.transition(|s| s.next_page(page_count));
    }

    pub fn previous_page(&mut self) {
        self.transition(|s| s.previous_page());
    }

    pub fn first_page(&mut self) {
        self.go_to_page(1);
    }

    pub fn last_page(&mut self) {
        self.go_to_page(self.view.page_count);
    }

    fn transition(&mut self, f: impl FnOnce(ViewState) -> ViewState) {
        self.state = f(self.state.clone());
        self.refresh();
    }

    fn refresh(&mut self) {
        if self.load_state == LoadState::Loading {
            self.view = View::empty(self.state.clone());
            return;
        }
        self.view = apply(&self.state, &self.records);
        self.state = self.view.state.clone();
    }

    // -------------------- Derived data ---------------------- //

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.load_state {
            LoadState::Failed(message) => Some(message),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[cfg(test)]
    pub fn filtered_sorted(&self) -> Vec<&Record> {
        self.view.rows.iter().map(|&idx| &self.records[idx]).collect()
    }

    pub fn current_page(&self) -> Vec<&Record> {
        self.view.page.iter().map(|&idx| &self.records[idx]).collect()
    }

    pub fn page_count(&self) -> usize {
        self.view.page_count
    }

    pub fn page_window(&self) -> Vec<usize> {
        page_window(self.state.page_index, self.view.page_count)
    }

    pub fn totals(&self) -> Totals {
        if self.is_loading() {
            return Totals::default();
        }
        Totals::from_records(&self.records)
    }

    /// 1-based position of the current page inside the filtered rows and their total.
    pub fn showing(&self) -> (usize, usize, usize) {
        let total = self.view.rows.len();
        if self.view.page.is_empty() {
            return (0, 0, total);
        }
        let first = (self.state.page_index - 1) * self.state.page_size + 1;
        (first, first + self.view.page.len() - 1, total)
    }

    pub fn sort_indicator(&self, key: SortKey) -> &'static str {
        if self.state.sort_key != key {
            "↕"
        } else if self.state.sort_ascending {
            "↑"
        } else {
            "↓"
        }
    }
}
