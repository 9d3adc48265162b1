use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{Clear, ClearType},
};
use folio_core::{CardId, Command, RenderImage};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

/// Rows scrolled by a single `j`/`k` press.
pub const SCROLL_STEP_ROWS: f32 = 3.0;

/// Draws page images through the kitty graphics protocol. Each card gets its
/// own image id; pixel data is transmitted once and later draws only move
/// the placement.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_ids: HashMap<CardId, u32>,
    next_image_id: u32,
}

/// Rows of the source image to show, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCrop {
    pub y: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
    pub crop: Option<SourceCrop>,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
            crop: None,
        }
    }

    pub fn with_crop(mut self, crop: SourceCrop) -> Self {
        self.crop = Some(crop);
        self
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_ids: HashMap::new(),
            next_image_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn is_transmitted(&self, card: CardId) -> bool {
        self.image_ids.contains_key(&card)
    }

    /// Places the card image at the cursor, transmitting it first if the
    /// terminal has not seen it yet.
    pub fn draw(&mut self, card: CardId, image: &RenderImage, params: DrawParams) -> Result<()> {
        let image_id = match self.image_ids.get(&card) {
            Some(&id) => id,
            None => {
                let id = self.next_image_id;
                self.next_image_id = self.next_image_id.wrapping_add(1).max(1);
                self.transmit(id, image)?;
                self.image_ids.insert(card, id);
                id
            }
        };
        self.place(image_id, image, params)
    }

    fn transmit(&mut self, image_id: u32, image: &RenderImage) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;
        trace!(image_id, bytes = buffer.len(), "transmitting image");

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=t,f=100,q=2,i={},s={},v={},m={}",
                    image_id,
                    image.width,
                    image.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }
        Ok(())
    }

    fn place(&mut self, image_id: u32, image: &RenderImage, params: DrawParams) -> Result<()> {
        let crop = params.crop.unwrap_or(SourceCrop {
            y: 0,
            height: image.height,
        });
        let y = crop.y.min(image.height.saturating_sub(1));
        let height = crop.height.clamp(1, image.height.saturating_sub(y).max(1));
        write!(
            self.writer,
            "\u{1b}_Ga=p,i={},p=1,C=1,q=2,z=-1,c={},r={},x=0,y={},w={},h={}\u{1b}\\",
            image_id, params.columns, params.rows, y, image.width, height
        )?;
        self.writer.flush()?;
        Ok(())
    }

    /// Removes every visible placement but keeps transmitted data around.
    pub fn delete_placements(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=a,q=2\u{1b}\\")?;
        Ok(())
    }

    /// Drops all image data, e.g. after the cards were rebuilt.
    pub fn forget_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        self.image_ids.clear();
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    BeginGoTo,
    GoToChanged { query: String },
    GoToSubmit { query: String },
    GoToCancel,
    OpenCurrent,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    GoTo,
    Sidebar,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    query_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.query_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::GoTo => self.map_event_goto(event),
            InputMode::Sidebar => self.map_event_sidebar(event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                self.scroll(1.0)
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                self.scroll(-1.0)
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.reset_count();
                UiEvent::Command(Command::ScrollToTop)
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                self.reset_count();
                UiEvent::Command(Command::ScrollToBottom)
            }
            (KeyCode::Char(':'), _) | (KeyCode::Char('/'), _) => {
                self.set_mode(InputMode::GoTo);
                UiEvent::BeginGoTo
            }
            (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleSidebar)
            }
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::FitWidth)
            }
            (KeyCode::Char('f'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleFullscreen)
            }
            (KeyCode::Char('d'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleTheme)
            }
            (KeyCode::Char('o'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::OpenCurrent
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_event_sidebar(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) | (KeyCode::Char('t'), _) | (KeyCode::Char('T'), _) => {
                UiEvent::Command(Command::CloseSidebar)
            }
            (KeyCode::Enter, _) => UiEvent::Command(Command::SidebarActivate),
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::Command(Command::SidebarMove { delta: 1 })
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::Command(Command::SidebarMove { delta: -1 })
            }
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn map_event_goto(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                UiEvent::GoToCancel
            }
            (KeyCode::Enter, _) => {
                let query = self.query_buffer.clone();
                self.set_mode(InputMode::Normal);
                UiEvent::GoToSubmit { query }
            }
            (KeyCode::Backspace, _) => {
                self.query_buffer.pop();
                UiEvent::GoToChanged {
                    query: self.query_buffer.clone(),
                }
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.query_buffer.push(c);
                UiEvent::GoToChanged {
                    query: self.query_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn scroll(&mut self, direction: f32) -> UiEvent {
        let count = self.take_count() as f32;
        UiEvent::Command(Command::ScrollBy {
            rows: direction * count * SCROLL_STEP_ROWS,
        })
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::GoTo => Some(format!(":{}", self.query_buffer)),
            _ if !self.pending_digits.is_empty() => Some(self.pending_digits.clone()),
            _ => None,
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn card(position: usize) -> CardId {
        CardId { pass: 0, position }
    }

    fn pixel() -> RenderImage {
        RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        }
    }

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .draw(card(0), &pixel(), DrawParams::clamped(10, 5))
            .unwrap();
        let output = String::from_utf8(renderer.writer).unwrap();
        assert!(output.starts_with("\u{1b}_Ga=t,f=100"));
        assert!(output.contains("a=p,i=1,p=1"));
        assert!(output.contains("c=10,r=5"));
    }

    #[test]
    fn kitty_transmits_each_card_once() {
        let mut renderer = KittyRenderer::new(Vec::new());
        renderer
            .draw(card(0), &pixel(), DrawParams::clamped(4, 2))
            .unwrap();
        renderer
            .draw(card(0), &pixel(), DrawParams::clamped(4, 2))
            .unwrap();
        renderer
            .draw(card(1), &pixel(), DrawParams::clamped(4, 2))
            .unwrap();
        let output = String::from_utf8(renderer.writer.clone()).unwrap();
        assert_eq!(output.matches("a=t,").count(), 2);
        assert_eq!(output.matches("a=p,").count(), 3);
        assert!(output.contains("a=p,i=2,"));

        renderer.forget_images().unwrap();
        assert!(!renderer.is_transmitted(card(0)));
    }

    #[test]
    fn kitty_crop_is_clamped_to_image() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 2,
            height: 10,
            pixels: vec![0; 2 * 10 * 4],
        };
        let params = DrawParams::clamped(4, 2).with_crop(SourceCrop { y: 6, height: 9 });
        renderer.draw(card(0), &image, params).unwrap();
        let output = String::from_utf8(renderer.writer).unwrap();
        assert!(output.contains("x=0,y=6,w=2,h=4"));
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn scrolled_rows(event: UiEvent) -> f32 {
        match event {
            UiEvent::Command(Command::ScrollBy { rows }) => rows,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_uses_numeric_prefix_for_scrolling() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('1'))),
            UiEvent::None
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('2'))),
            UiEvent::None
        ));
        let rows = scrolled_rows(mapper.map_event(key_event(KeyCode::Char('j'))));
        assert_eq!(rows, 12.0 * SCROLL_STEP_ROWS);
    }

    #[test]
    fn event_mapper_resets_prefix_after_use() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('3')));
        let rows = scrolled_rows(mapper.map_event(key_event(KeyCode::Char('k'))));
        assert_eq!(rows, -3.0 * SCROLL_STEP_ROWS);
        let rows = scrolled_rows(mapper.map_event(key_event(KeyCode::Char('k'))));
        assert_eq!(rows, -SCROLL_STEP_ROWS);
    }

    #[test]
    fn event_mapper_drops_prefix_on_other_command() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('d'))),
            UiEvent::Command(Command::ToggleTheme)
        ));
        let rows = scrolled_rows(mapper.map_event(key_event(KeyCode::Char('j'))));
        assert_eq!(rows, SCROLL_STEP_ROWS);
    }

    #[test]
    fn event_mapper_pending_input_shows_digits_until_consumed() {
        let mut mapper = EventMapper::new();
        assert!(mapper.pending_input().is_none());
        mapper.map_event(key_event(KeyCode::Char('1')));
        mapper.map_event(key_event(KeyCode::Char('2')));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));
        mapper.map_event(key_event(KeyCode::Char('j')));
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_maps_view_controls() {
        let mut mapper = EventMapper::new();
        let mapped: Vec<_> = ['+', '-', '=', 'f', 't', 'g']
            .into_iter()
            .map(|c| mapper.map_event(key_event(KeyCode::Char(c))))
            .collect();
        assert!(matches!(mapped[0], UiEvent::Command(Command::ZoomIn)));
        assert!(matches!(mapped[1], UiEvent::Command(Command::ZoomOut)));
        assert!(matches!(mapped[2], UiEvent::Command(Command::FitWidth)));
        assert!(matches!(
            mapped[3],
            UiEvent::Command(Command::ToggleFullscreen)
        ));
        assert!(matches!(mapped[4], UiEvent::Command(Command::ToggleSidebar)));
        assert!(matches!(mapped[5], UiEvent::Command(Command::ScrollToTop)));

        assert!(matches!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::ScrollToBottom)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('o'))),
            UiEvent::OpenCurrent
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('q'))),
            UiEvent::Quit
        ));
    }

    #[test]
    fn event_mapper_goto_mode_collects_query() {
        let mut mapper = EventMapper::new();
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char(':'))),
            UiEvent::BeginGoTo
        ));
        assert_eq!(mapper.mode(), InputMode::GoTo);
        assert_eq!(mapper.pending_input().as_deref(), Some(":"));

        match mapper.map_event(key_event(KeyCode::Char('4'))) {
            UiEvent::GoToChanged { ref query } => assert_eq!(query, "4"),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Char('x'))) {
            UiEvent::GoToChanged { ref query } => assert_eq!(query, "4x"),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Backspace)) {
            UiEvent::GoToChanged { ref query } => assert_eq!(query, "4"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.pending_input().as_deref(), Some(":4"));

        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::GoToSubmit { ref query } => assert_eq!(query, "4"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn event_mapper_goto_escape_cancels() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('/')));
        mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('I'),
            KeyModifiers::SHIFT,
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::GoToCancel
        ));
        assert_eq!(mapper.mode(), InputMode::Normal);

        mapper.map_event(key_event(KeyCode::Char(':')));
        match mapper.map_event(key_event(KeyCode::Enter)) {
            UiEvent::GoToSubmit { ref query } => assert!(query.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn event_mapper_sidebar_mode_maps_navigation_keys() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Sidebar);

        match mapper.map_event(key_event(KeyCode::Char('j'))) {
            UiEvent::Command(Command::SidebarMove { delta }) => assert_eq!(delta, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        match mapper.map_event(key_event(KeyCode::Up)) {
            UiEvent::Command(Command::SidebarMove { delta }) => assert_eq!(delta, -1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::Command(Command::SidebarActivate)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Esc)),
            UiEvent::Command(Command::CloseSidebar)
        ));
        assert!(matches!(
            mapper.map_event(key_event(KeyCode::Char('t'))),
            UiEvent::Command(Command::CloseSidebar)
        ));
    }

    #[test]
    fn event_mapper_switching_modes_clears_pending_state() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        assert_eq!(mapper.pending_input().as_deref(), Some("1"));

        mapper.set_mode(InputMode::Sidebar);
        assert!(mapper.pending_input().is_none());
        mapper.set_mode(InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }
}
