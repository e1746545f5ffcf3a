use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::trace;

/// Single line prompt used for the search box and the page jump.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize, // in chars
    digits_only: bool,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub changed: bool,
    pub curser_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        let before = self.current_input.clone();
        let mut result = match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.enter(),
            (KeyCode::Esc, _) => self.escape(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.left(),
            (KeyCode::Right, _) => self.right(),
            (KeyCode::Home, _) => self.home(),
            (KeyCode::End, _) => self.end(),
            (kc, km) => self.key(kc, km),
        };
        result.changed = result.input != before;
        trace!("Input {:?} -> {:?}", key.code, result.input);
        result
    }

    /// Starts a fresh prompt prefilled with `s`, cursor at the end.
    pub fn start(&mut self, s: &str, digits_only: bool) {
        self.clear();
        self.digits_only = digits_only;
        self.current_input = s.to_string();
        self.curser_pos = s.chars().count();
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            changed: false,
            input: self.current_input.clone(),
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.digits_only = false;
        self.current_input.clear();
        self.curser_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.current_input.clear();
        self.curser_pos = 0;
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let idx = self.byte_pos();
            self.current_input.remove(idx);
        }
        self.get()
    }

    fn delete(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            let idx = self.byte_pos();
            self.current_input.remove(idx);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.curser_pos = self.curser_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            self.curser_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.curser_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.curser_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, modifier: KeyModifiers) -> InputResult {
        if modifier.contains(KeyModifiers::CONTROL) {
            return self.get();
        }
        if let Some(chr) = code.as_char()
            && (!self.digits_only || chr.is_ascii_digit())
        {
            let idx = self.byte_pos();
            self.current_input.insert(idx, chr);
            self.curser_pos += 1;
        }
        self.get()
    }

    fn byte_pos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}
