use std::time::Duration;

use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::domain::{AdminConfig, CMDMode};
use crate::model::Model;
use crate::record::{Record, SortKey};

pub const HEADER_HEIGHT: u16 = 4;
pub const PAGER_HEIGHT: u16 = 1;
pub const CMDLINE_HEIGHT: u16 = 1;
const STATUS_MESSAGE_FADE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct AdminUI {
    event_date: String,
}

impl AdminUI {
    pub fn new(cfg: &AdminConfig) -> Self {
        Self {
            event_date: cfg.event_date.format("%Y-%m-%d %H:%M").to_string(),
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let [header, body, pager, cmdline] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(PAGER_HEIGHT),
            Constraint::Length(CMDLINE_HEIGHT),
        ])
        .areas(frame.area());

        self.draw_header(model, frame, header);
        self.draw_body(model, frame, body);
        self.draw_pager(model, frame, pager);
        self.draw_cmdline(model, frame, cmdline);

        if let Some(message) = model.popup_message() {
            self.draw_popup(message, frame);
        }
    }

    fn draw_header(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let engine = model.engine();
        let totals = engine.totals();
        let parts = model.countdown().parts();

        let countdown = if parts.is_over() {
            Line::from(vec![" Event ".into(), "has started".green().bold()])
        } else {
            Line::from(vec![
                format!(" Event on {} in ", self.event_date).into(),
                format!(
                    "{}d {:02}h {:02}m {:02}s",
                    parts.days, parts.hours, parts.minutes, parts.seconds
                )
                .yellow()
                .bold(),
            ])
        };
        let totals = Line::from(vec![
            " Guests: ".into(),
            totals.attending_people.to_string().green().bold(),
            "  Confirmed: ".into(),
            totals.confirmed.to_string().green(),
            "  Declined: ".into(),
            totals.declined.to_string().red(),
        ]);

        let state = engine.state();
        let search = if state.search_text.is_empty() {
            "–".to_string()
        } else {
            format!("\"{}\"", state.search_text)
        };
        let filters = Line::from(vec![
            " Showing: ".into(),
            state.attendance_filter.label().blue().bold(),
            "  Search: ".into(),
            search.blue(),
            "  Per page: ".into(),
            state.page_size.to_string().blue(),
        ]);

        let fetching = if model.is_fetching() { "(fetching) " } else { "" };
        let title = Line::from(format!(" RSVP admin [{}] {fetching}", model.source_name()).bold());
        let block = Block::bordered()
            .title(title.centered())
            .border_set(border::THICK);
        frame.render_widget(Paragraph::new(Text::from(vec![totals, countdown])).block(block), area);

        // Filter summary sits on the bottom border
        let bottom = Rect {
            y: area.y + area.height.saturating_sub(1),
            height: 1,
            x: area.x + 1,
            width: area.width.saturating_sub(2),
        };
        frame.render_widget(Paragraph::new(filters), bottom);
    }

    fn draw_body(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let engine = model.engine();
        if engine.is_loading() {
            frame.render_widget(Self::notice(Line::from("Loading confirmations ...".yellow())), area);
            return;
        }
        if let Some(message) = engine.error() {
            frame.render_widget(Self::notice(Line::from(message.to_string().red().bold())), area);
            return;
        }

        let page = engine.current_page();
        if page.is_empty() {
            frame.render_widget(Self::notice(Line::from("No confirmations match".italic())), area);
            return;
        }

        let (first, _, _) = engine.showing();
        let header = Row::new(vec![
            Cell::from("#"),
            Cell::from(Self::column_title(model, SortKey::NAME)),
            Cell::from(Self::column_title(model, SortKey::PARTY)),
            Cell::from("Attending"),
            Cell::from(Self::column_title(model, SortKey::CREATED)),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));

        let rows = page
            .iter()
            .enumerate()
            .map(|(idx, record)| Self::record_row(first + idx, record));

        let widths = [
            Constraint::Length(5),
            Constraint::Min(20),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Length(18),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .block(Block::bordered());
        frame.render_widget(table, area);
    }

    fn column_title(model: &Model, key: SortKey) -> String {
        format!("{} {}", key.label(), model.engine().sort_indicator(key))
    }

    fn record_row(position: usize, record: &Record) -> Row<'static> {
        let attending = if record.attending {
            Span::from("yes").green()
        } else {
            Span::from("no").red()
        };
        let party = if record.attending {
            record.party_size.to_string()
        } else {
            "–".to_string()
        };
        let submitted = record
            .created_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "–".to_string());
        Row::new(vec![
            Cell::from(position.to_string()).dark_gray(),
            Cell::from(record.name.clone()),
            Cell::from(party),
            Cell::from(attending),
            Cell::from(submitted),
        ])
    }

    fn notice(line: Line<'static>) -> Paragraph<'static> {
        Paragraph::new(line.centered()).block(Block::bordered())
    }

    fn draw_pager(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let engine = model.engine();
        let current = engine.state().page_index;
        let page_count = engine.page_count();

        let mut spans: Vec<Span> = vec![" ‹ ".into()];
        for page in engine.page_window() {
            if page == current {
                spans.push(format!("[{page}]").reversed().bold());
            } else {
                spans.push(format!(" {page} ").into());
            }
        }
        spans.push(" › ".into());

        let (first, last, total) = engine.showing();
        spans.push(format!("  {first}–{last} of {total}").dark_gray());
        if page_count > 0 {
            spans.push(format!("  page {current}/{page_count}").dark_gray());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_cmdline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        if let Some((mode, input)) = model.cmd_input() {
            let prompt = match mode {
                CMDMode::Search => "Search: ",
                CMDMode::GoToPage => "Go to page: ",
            };
            let line = Line::from(vec![prompt.bold(), input.input.clone().into()]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + prompt.len() as u16 + input.curser_pos as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let message = model.status_message().to_string();
        let styled = if model.last_status_message_update().elapsed() > STATUS_MESSAGE_FADE {
            message.dark_gray()
        } else {
            message.white()
        };
        let line = Line::from(vec![styled, "   ? help  q quit".dark_gray()]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let height = message.lines().count() as u16 + 2;
        let width = message.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u16 + 4;
        let area = Self::popup_area(frame.area(), width, height);

        let block = Block::bordered()
            .title(Line::from(" Help ".bold()).centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(message.to_string()).wrap(Wrap { trim: false }).block(block),
            area,
        );
    }

    fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
        let [area] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::horizontal([Constraint::Length(width)])
            .flex(Flex::Center)
            .areas(area);
        area
    }
}
