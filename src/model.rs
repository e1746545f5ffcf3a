use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

use tracing::{debug, error, info, trace};

use crate::countdown::Countdown;
use crate::domain::{AdminConfig, CMDMode, HELP_TEXT, Message, PAGE_SIZES, RsvpError};
use crate::engine::{ViewEngine, ViewState};
use crate::inputter::{InputResult, Inputter};
use crate::source::{FetchResult, RecordSource, spawn_fetch};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

/// One admin session: the view engine plus everything the terminal needs around it.
pub struct Model {
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    engine: ViewEngine,
    source: Arc<dyn RecordSource>,
    fetch: Option<Receiver<FetchResult>>,
    fetch_started: Instant,
    countdown: Countdown,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    popup_message: Option<String>,
    status_message: String,
    last_status_message_update: Instant,
    terminal_size: (u16, u16),
}

impl Model {
    pub fn init(config: &AdminConfig, source: Arc<dyn RecordSource>) -> Result<Self, RsvpError> {
        let mut model = Self {
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            engine: ViewEngine::new(ViewState::with_page_size_default(config.page_size)),
            source,
            fetch: None,
            fetch_started: Instant::now(),
            countdown: Countdown::new(config.event_date),
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            popup_message: None,
            status_message: String::new(),
            last_status_message_update: Instant::now(),
            terminal_size: (0, 0),
        };
        model.reload();
        Ok(model)
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), RsvpError> {
        self.poll_fetch();

        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit => self.exit(),
                    Message::Help => self.show_help(),
                    Message::Reload => self.reload(),
                    Message::Search => self.enter_cmd_mode(CMDMode::Search),
                    Message::GoTo => self.enter_cmd_mode(CMDMode::GoToPage),
                    Message::NextPage => self.engine.next_page(),
                    Message::PreviousPage => self.engine.previous_page(),
                    Message::FirstPage => self.engine.first_page(),
                    Message::LastPage => self.engine.last_page(),
                    Message::JumpToPage(page) => self.engine.go_to_page(page),
                    Message::ShowAttendance(filter) => {
                        self.engine.set_attendance_filter(filter);
                        self.set_status_message(format!("Showing {}", filter.label()));
                    }
                    Message::ToggleSort(key) => {
                        self.engine.toggle_sort(key);
                        let direction = if self.engine.state().sort_ascending { "ascending" } else { "descending" };
                        self.set_status_message(format!("Sorted by {} {direction}", key.label()));
                    }
                    Message::SortBy(key) => {
                        self.engine.set_sort_key(key);
                        self.set_status_message(format!("Sorted by {}", key.label()));
                    }
                    Message::GrowPageSize => self.change_page_size(true),
                    Message::ShrinkPageSize => self.change_page_size(false),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::RawKey(_) => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }
        Ok(())
    }

    // -------------------- Snapshot loading ---------------------- //

    /// Starts a new fetch, an outstanding one is superseded.
    fn reload(&mut self) {
        if self.fetch.is_some() {
            debug!("Superseding outstanding fetch");
        }
        info!("Loading confirmations from {} ...", self.source.describe());
        self.engine.begin_loading();
        self.fetch = Some(spawn_fetch(Arc::clone(&self.source)));
        self.fetch_started = Instant::now();
        self.set_status_message("Loading ...");
    }

    fn poll_fetch(&mut self) {
        let Some(rx) = &self.fetch else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => Err(RsvpError::LoadingFailed(
                "fetch ended without a result".into(),
            )),
        };
        self.fetch = None;

        let duration = self.fetch_started.elapsed().as_millis();
        match result {
            Ok(records) => {
                let count = records.len();
                self.engine.load(records);
                self.set_status_message(format!("Loaded {count} confirmations in {duration}ms ..."));
            }
            Err(e) => {
                error!("Loading confirmations failed: {e}");
                self.engine.fail(format!("Could not load the confirmations: {e}"));
                self.set_status_message("Error while loading the confirmations");
            }
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch.is_some()
    }

    // -------------------- Control handling functions ---------------------- //

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                // Esc in the table drops an active search
                if !self.engine.state().search_text.is_empty() {
                    self.engine.set_search("");
                    self.set_status_message("Search cleared");
                }
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.popup_message = None;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup_message = Some(HELP_TEXT.to_string());
    }

    fn ui_resize(&mut self, width: u16, height: u16) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.terminal_size.0, width, self.terminal_size.1, height
        );
        self.terminal_size = (width, height);
    }

    fn change_page_size(&mut self, grow: bool) {
        let current = self.engine.state().page_size;
        let next = if grow {
            PAGE_SIZES.iter().copied().find(|&s| s > current)
        } else {
            PAGE_SIZES.iter().rev().copied().find(|&s| s < current)
        };
        if let Some(page_size) = next {
            self.engine.set_page_size(page_size);
            self.set_status_message(format!("{page_size} confirmations per page"));
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);

        match mode {
            CMDMode::Search => self.input.start(&self.engine.state().search_text, false),
            CMDMode::GoToPage => self.input.start("", true),
        }
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: ratatui::crossterm::event::KeyEvent) {
        self.last_input = self.input.read(key);

        // The search box filters while typing
        if self.cmd_mode == Some(CMDMode::Search) && self.last_input.changed {
            self.engine.set_search(self.last_input.input.clone());
        }
        if self.last_input.finished {
            self.handle_cmd_input();
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {:?}", self.last_input);

        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        let cmd_input = self.last_input.input.clone();
        match self.cmd_mode {
            Some(CMDMode::Search) => {
                if self.last_input.canceled {
                    self.engine.set_search("");
                }
                let (_, _, total) = self.engine.showing();
                self.set_status_message(format!("Found {total} confirmations"));
            }
            Some(CMDMode::GoToPage) => {
                if !self.last_input.canceled
                    && let Ok(page) = cmd_input.parse::<usize>()
                {
                    self.engine.go_to_page(page);
                }
            }
            None => {
                info!("Cmd mode is none!")
            }
        }

        self.cmd_mode = None;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    // -------------------- Accessors for the UI ---------------------- //

    pub fn engine(&self) -> &ViewEngine {
        &self.engine
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    pub fn popup_message(&self) -> Option<&str> {
        self.popup_message.as_deref()
    }

    /// The active prompt and its current content.
    pub fn cmd_input(&self) -> Option<(CMDMode, &InputResult)> {
        if self.modus == Modus::CMDINPUT {
            self.cmd_mode.map(|mode| (mode, &self.last_input))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AttendanceFilter, Record, SortKey};
    use crate::source::MemorySource;
    use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    fn config() -> AdminConfig {
        AdminConfig::new(PathBuf::from("memory")).unwrap()
    }

    fn guests(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::confirmation(&format!("Guest {i:02}"), 2, i % 3 != 0).unwrap())
            .collect()
    }

    fn settle(model: &mut Model) {
        for _ in 0..500 {
            model.update(None).unwrap();
            if !model.is_fetching() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("fetch did not finish");
    }

    fn loaded(records: Vec<Record>) -> Model {
        let mut model = Model::init(&config(), Arc::new(MemorySource::new(records))).unwrap();
        settle(&mut model);
        model
    }

    fn key(model: &mut Model, code: KeyCode) {
        let msg = Message::RawKey(KeyEvent::new(code, KeyModifiers::NONE));
        model.update(Some(msg)).unwrap();
    }

    #[test]
    fn starts_loading_then_shows_first_page() {
        let mut model = Model::init(&config(), Arc::new(MemorySource::new(guests(30)))).unwrap();
        assert!(model.engine().is_loading());
        assert!(model.engine().current_page().is_empty());
        settle(&mut model);
        assert!(!model.engine().is_loading());
        assert_eq!(model.engine().current_page().len(), 10);
        assert_eq!(model.engine().totals().confirmed, 20);
        assert_eq!(model.engine().totals().declined, 10);
        assert_eq!(model.engine().totals().attending_people, 40);
    }

    #[test]
    fn failed_fetch_becomes_error_state() {
        let mut model = Model::init(&config(), Arc::new(MemorySource::failing("offline"))).unwrap();
        settle(&mut model);
        assert!(model.engine().error().is_some_and(|e| e.contains("offline")));
        assert!(model.engine().filtered_sorted().is_empty());
        assert_eq!(model.status, Status::READY);
    }

    #[test]
    fn reload_replaces_snapshot() {
        let mut model = loaded(guests(5));
        model.update(Some(Message::Reload)).unwrap();
        assert!(model.engine().is_loading());
        assert!(model.engine().current_page().is_empty());
        settle(&mut model);
        assert_eq!(model.engine().records().len(), 5);
    }

    /// First fetch is slow and returns `first`, every later one returns `second` at once.
    struct SlowFirstSource {
        calls: AtomicUsize,
        first: Vec<Record>,
        second: Vec<Record>,
    }

    impl RecordSource for SlowFirstSource {
        fn fetch_all(&self) -> FetchResult {
            if self.calls.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(300));
                return Ok(self.first.clone());
            }
            Ok(self.second.clone())
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[test]
    fn superseded_fetch_is_discarded() {
        let source = Arc::new(SlowFirstSource {
            calls: AtomicUsize::new(0),
            first: guests(3),
            second: guests(7),
        });
        let mut model = Model::init(&config(), source.clone()).unwrap();
        // Let the first fetch take the slow path before asking again
        while source.calls.load(AtomicOrdering::SeqCst) < 1 {
            std::thread::sleep(Duration::from_millis(1));
        }
        model.update(Some(Message::Reload)).unwrap();
        settle(&mut model);
        assert_eq!(model.engine().records().len(), 7);

        // The slow first fetch finishes later and must not replace the snapshot
        while source.calls.load(AtomicOrdering::SeqCst) < 2 {
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(500));
        model.update(None).unwrap();
        assert!(!model.is_fetching());
        assert_eq!(model.engine().records().len(), 7);
        assert_eq!(model.engine().totals().confirmed, 4);
    }

    #[test]
    fn search_prompt_filters_while_typing() {
        let mut model = loaded(guests(30));
        model.update(Some(Message::ShowAttendance(AttendanceFilter::ALL))).unwrap();
        model.update(Some(Message::Search)).unwrap();
        assert!(model.raw_keyevents());
        key(&mut model, KeyCode::Char('1'));
        assert_eq!(model.engine().state().search_text, "1");
        assert_eq!(model.engine().filtered_sorted().len(), 12);
        key(&mut model, KeyCode::Enter);
        assert!(!model.raw_keyevents());
        assert_eq!(model.engine().state().search_text, "1");

        // Esc in the table clears the search again
        model.update(Some(Message::Exit)).unwrap();
        assert!(model.engine().state().search_text.is_empty());
    }

    #[test]
    fn canceled_search_prompt_clears_search() {
        let mut model = loaded(guests(30));
        model.update(Some(Message::Search)).unwrap();
        key(&mut model, KeyCode::Char('2'));
        key(&mut model, KeyCode::Esc);
        assert!(model.engine().state().search_text.is_empty());
        assert!(model.cmd_input().is_none());
    }

    #[test]
    fn goto_prompt_ignores_missing_pages() {
        let mut model = loaded(guests(30));
        model.update(Some(Message::ShowAttendance(AttendanceFilter::ALL))).unwrap();
        model.update(Some(Message::GoTo)).unwrap();
        key(&mut model, KeyCode::Char('9'));
        key(&mut model, KeyCode::Enter);
        assert_eq!(model.engine().state().page_index, 1);

        model.update(Some(Message::GoTo)).unwrap();
        key(&mut model, KeyCode::Char('3'));
        key(&mut model, KeyCode::Enter);
        assert_eq!(model.engine().state().page_index, 3);
    }

    #[test]
    fn page_size_cycles_through_presets() {
        let mut model = loaded(guests(30));
        model.update(Some(Message::GrowPageSize)).unwrap();
        assert_eq!(model.engine().state().page_size, 20);
        model.update(Some(Message::ShrinkPageSize)).unwrap();
        model.update(Some(Message::ShrinkPageSize)).unwrap();
        assert_eq!(model.engine().state().page_size, 5);
        model.update(Some(Message::ShrinkPageSize)).unwrap();
        assert_eq!(model.engine().state().page_size, 5);
    }

    #[test]
    fn help_popup_swallows_view_keys() {
        let mut model = loaded(guests(30));
        model.update(Some(Message::Help)).unwrap();
        assert!(model.popup_message().is_some());
        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.engine().state().page_index, 1);
        model.update(Some(Message::Exit)).unwrap();
        assert!(model.popup_message().is_none());
        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.engine().state().page_index, 2);
    }

    #[test]
    fn sort_toggle_reports_direction() {
        let mut model = loaded(guests(3));
        model.update(Some(Message::ToggleSort(SortKey::NAME))).unwrap();
        assert_eq!(model.status_message(), "Sorted by Name descending");
        model.update(Some(Message::Quit)).unwrap();
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn sort_by_restarts_from_first_page() {
        let mut model = loaded(guests(30));
        model.update(Some(Message::NextPage)).unwrap();
        model.update(Some(Message::ToggleSort(SortKey::PARTY))).unwrap();
        assert_eq!(model.engine().state().page_index, 2);
        model.update(Some(Message::SortBy(SortKey::CREATED))).unwrap();
        assert_eq!(model.engine().state().page_index, 1);
        assert_eq!(model.engine().state().sort_key, SortKey::CREATED);
    }
}
