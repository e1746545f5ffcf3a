use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crate::domain::{AdminConfig, Message, RsvpError};
use crate::model::Model;
use crate::record::{AttendanceFilter, SortKey};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AdminConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, RsvpError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(width, height) => return Ok(Some(Message::Resize(width, height))),
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('g'), _) => Some(Message::GoTo),
            (KeyCode::Right, _) | (KeyCode::Char('l'), _) => Some(Message::NextPage),
            (KeyCode::Left, _) | (KeyCode::Char('h'), _) => Some(Message::PreviousPage),
            (KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Char('a'), _) => Some(Message::ShowAttendance(AttendanceFilter::ATTENDING)),
            (KeyCode::Char('d'), _) => Some(Message::ShowAttendance(AttendanceFilter::DECLINED)),
            (KeyCode::Char('e'), _) => Some(Message::ShowAttendance(AttendanceFilter::ALL)),
            (KeyCode::Char('n'), _) => Some(Message::ToggleSort(SortKey::NAME)),
            (KeyCode::Char('p'), _) => Some(Message::ToggleSort(SortKey::PARTY)),
            (KeyCode::Char('c'), _) => Some(Message::ToggleSort(SortKey::CREATED)),
            (KeyCode::Char('N'), _) => Some(Message::SortBy(SortKey::NAME)),
            (KeyCode::Char('P'), _) => Some(Message::SortBy(SortKey::PARTY)),
            (KeyCode::Char('C'), _) => Some(Message::SortBy(SortKey::CREATED)),
            (KeyCode::Char('+'), _) => Some(Message::GrowPageSize),
            (KeyCode::Char('-'), _) => Some(Message::ShrinkPageSize),
            (KeyCode::Char(c), _) if ('1'..='9').contains(&c) => {
                c.to_digit(10).map(|d| Message::JumpToPage(d as usize))
            }
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
