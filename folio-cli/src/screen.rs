use std::io::{self, Write};

use anyhow::Result;
use crossterm::cursor;
use crossterm::style::{Attribute, Color, Colors, Print, SetAttribute, SetColors};
use crossterm::terminal::{self, Clear, ClearType};
use folio_core::{
    CardGeometry, ImageSlot, LoadState, Locale, RenderImage, ThemeMode, Viewer,
    CARD_CHROME_ROWS,
};
use folio_tty::{write_status_line, DrawParams, KittyRenderer, SourceCrop};

/// Transient state owned by the event loop rather than the viewer.
#[derive(Debug, Default)]
pub struct UiState {
    pub pending: Option<String>,
    /// Shown in the status line until the next key press.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Screen {
    pub cols: u32,
    pub rows: u32,
    /// Cell size in pixels, zero when the terminal does not report it.
    pub cell_width: f32,
    pub cell_height: f32,
}

impl Screen {
    pub fn query() -> Result<Self> {
        match terminal::window_size() {
            Ok(window) => {
                let cols = u32::from(window.columns).max(1);
                let rows = u32::from(window.rows).max(1);
                Ok(Self {
                    cols,
                    rows,
                    cell_width: f32::from(window.width) / cols as f32,
                    cell_height: f32::from(window.height) / rows as f32,
                })
            }
            Err(_) => {
                let (cols, rows) = terminal::size()?;
                Ok(Self {
                    cols: u32::from(cols).max(1),
                    rows: u32::from(rows).max(1),
                    cell_width: 0.0,
                    cell_height: 0.0,
                })
            }
        }
    }
}

/// Title bar and status line rows; fullscreen hides both.
pub fn chrome_rows(fullscreen: bool) -> (u32, u32) {
    if fullscreen {
        (0, 0)
    } else {
        (1, 1)
    }
}

pub fn viewport_rows(total_rows: u16, fullscreen: bool) -> f32 {
    let (header, footer) = chrome_rows(fullscreen);
    u32::from(total_rows).saturating_sub(header + footer).max(1) as f32
}

pub fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &mut Viewer,
    ui: &UiState,
) -> Result<()> {
    let screen = Screen::query()?;
    let theme = viewer.controls().theme();
    let (header, footer) = chrome_rows(viewer.controls().is_fullscreen());

    renderer.begin_sync_update()?;
    renderer.delete_placements()?;
    {
        let writer = renderer.writer();
        crossterm::queue!(
            writer,
            SetColors(theme_colors(theme)),
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
    }

    match viewer.state().clone() {
        LoadState::Failed(message) => draw_message(renderer, &screen, &message)?,
        LoadState::Empty => {}
        LoadState::Ready => {
            if header > 0 {
                let title = viewer.title().unwrap_or_default().to_string();
                let line = truncate_with_ellipsis(format!(" {}", title), screen.cols as usize);
                print_inverted(renderer.writer(), 0, 0, &line)?;
            }
            draw_cards(renderer, viewer, &screen, header)?;
            if viewer.sidebar().is_open() {
                draw_sidebar(renderer, viewer, &screen, header)?;
            }
        }
    }

    if footer > 0 {
        let status = format_status(viewer, ui);
        let writer = renderer.writer();
        crossterm::queue!(
            writer,
            cursor::MoveTo(0, screen.rows.saturating_sub(1) as u16),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(writer, &truncate_with_ellipsis(status, screen.cols as usize))?;
    }

    renderer.end_sync_update()
}

fn theme_colors(theme: ThemeMode) -> Colors {
    match theme {
        ThemeMode::Light => Colors::new(Color::Reset, Color::Reset),
        ThemeMode::Dark => Colors::new(Color::Grey, Color::Black),
    }
}

pub fn format_status(viewer: &Viewer, ui: &UiState) -> String {
    let mut parts = Vec::new();
    if !viewer.indicator().is_empty() {
        parts.push(viewer.indicator().to_string());
    }
    if viewer.is_ready() {
        parts.push(format!("{:.0}%", viewer.controls().scale() * 100.0));
    }
    parts.push(viewer.controls().theme().as_str().to_string());
    if let Some(pending) = ui.pending.as_deref().filter(|s| !s.is_empty()) {
        parts.push(pending.to_string());
    }
    if let Some(notice) = &ui.notice {
        parts.push(notice.clone());
    }
    format!(" {}", parts.join(" | "))
}

fn draw_cards(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &Viewer,
    screen: &Screen,
    header: u32,
) -> Result<()> {
    let viewport = *viewer.viewport();
    let offset = viewport.offset.round();
    let rows = viewport.height.round().max(1.0) as i64;
    let locale = viewer.config().locale;
    let theme = viewer.controls().theme();
    let current = viewer.current_card().map(|card| card.id);
    let width = screen.cols as usize;

    for geometry in viewer.layout().cards() {
        let top = (geometry.top - offset).round() as i64;
        let height = geometry.height.round() as i64;
        if top + height <= 0 || top >= rows {
            continue;
        }
        let Some(card) = viewer.card(geometry.card) else {
            continue;
        };
        let screen_row = |row: i64| (i64::from(header) + row) as u16;

        if (0..rows).contains(&top) {
            let line = truncate_with_ellipsis(format!(" {}", card.title), width);
            if Some(card.id) == current {
                print_inverted(renderer.writer(), 0, screen_row(top), &line)?;
            } else {
                print_at(renderer.writer(), 0, screen_row(top), &line)?;
            }
        }
        let footer = top + height - 1;
        if (0..rows).contains(&footer) {
            let line = truncate_with_ellipsis(
                format!(" [{}] {}", card.open_label, card.source),
                width,
            );
            print_at(renderer.writer(), 0, screen_row(footer), &line)?;
        }

        let image_top = top + 1;
        let image_rows = image_rows_of(geometry);
        let start = image_top.max(0);
        let end = (image_top + image_rows).min(rows);
        if end <= start {
            continue;
        }

        match &card.image {
            ImageSlot::Loaded(image) => {
                let columns = card_columns(image, image_rows as u32, screen);
                let crop = image_crop(
                    image.height,
                    image_rows as u32,
                    (start - image_top) as u32,
                    (end - start) as u32,
                );
                let col = screen.cols.saturating_sub(columns) / 2;
                crossterm::queue!(
                    renderer.writer(),
                    cursor::MoveTo(col as u16, screen_row(start))
                )?;
                let params = DrawParams::clamped(columns, (end - start) as u32).with_crop(crop);
                if theme.is_dark() && !renderer.is_transmitted(card.id) {
                    renderer.draw(card.id, &inverted(image), params)?;
                } else {
                    renderer.draw(card.id, image, params)?;
                }
            }
            slot => {
                let middle = image_top + image_rows / 2;
                if (start..end).contains(&middle) {
                    let text = placeholder_text(slot, locale);
                    let col = screen.cols.saturating_sub(text.chars().count() as u32) / 2;
                    print_at(renderer.writer(), col as u16, screen_row(middle), &text)?;
                }
            }
        }
    }
    Ok(())
}

fn image_rows_of(geometry: &CardGeometry) -> i64 {
    (geometry.height.round() as i64 - CARD_CHROME_ROWS as i64).max(1)
}

fn placeholder_text(slot: &ImageSlot, locale: Locale) -> String {
    match slot {
        ImageSlot::Broken { .. } => format!("[ {} ]", locale.image_unavailable()),
        _ => "…".to_string(),
    }
}

/// Pixel rows of an image spread over `image_rows` cells that fall inside
/// the `shown` rows starting `skipped` rows into the image.
pub fn image_crop(image_height: u32, image_rows: u32, skipped: u32, shown: u32) -> SourceCrop {
    let image_rows = u64::from(image_rows.max(1));
    let height = u64::from(image_height.max(1));
    let y = (u64::from(skipped) * height / image_rows).min(height - 1);
    let span = (u64::from(shown) * height).div_ceil(image_rows).max(1);
    SourceCrop {
        y: y as u32,
        height: span.min(height - y) as u32,
    }
}

/// Columns that keep the image's aspect ratio at `image_rows` rows tall.
pub fn card_columns(image: &RenderImage, image_rows: u32, screen: &Screen) -> u32 {
    let max_cols = screen.cols.saturating_sub(2).max(1);
    if image.width == 0 || image.height == 0 {
        return max_cols;
    }
    // Terminal cells are roughly twice as tall as they are wide.
    let cell_ratio = if screen.cell_width > 0.0 && screen.cell_height > 0.0 {
        screen.cell_height / screen.cell_width
    } else {
        2.0
    };
    let aspect = image.width as f32 / image.height as f32;
    let cols = (image_rows as f32 * cell_ratio * aspect).round();
    if cols.is_finite() {
        (cols as u32).clamp(1, max_cols)
    } else {
        max_cols
    }
}

fn inverted(image: &RenderImage) -> RenderImage {
    let mut pixels = image.pixels.clone();
    for chunk in pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
    RenderImage {
        width: image.width,
        height: image.height,
        pixels,
    }
}

fn draw_message(
    renderer: &mut KittyRenderer<io::Stdout>,
    screen: &Screen,
    message: &str,
) -> Result<()> {
    let width = screen.cols.saturating_sub(4).max(1) as usize;
    let row = screen.rows.saturating_sub(1) / 2;
    let line = truncate_with_ellipsis(message.to_string(), width);
    print_inverted(renderer.writer(), 2, row as u16, &line)
}

fn draw_sidebar(
    renderer: &mut KittyRenderer<io::Stdout>,
    viewer: &mut Viewer,
    screen: &Screen,
    header: u32,
) -> Result<()> {
    let rows_available = screen.rows.saturating_sub(header + 1);
    if screen.cols < 20 || rows_available < 6 {
        return Ok(());
    }
    let max_inner_width = screen.cols.saturating_sub(6) as usize;
    let heading = viewer.title().unwrap_or_default().to_string();
    let base_width = viewer
        .sidebar()
        .entries()
        .iter()
        .map(|entry| entry.text.chars().count() + 2)
        .max()
        .unwrap_or(0)
        .max(heading.chars().count());
    let inner_width = base_width.clamp(20.min(max_inner_width), max_inner_width);

    let max_content_height = rows_available.saturating_sub(6) as usize;
    if max_content_height == 0 {
        return Ok(());
    }
    let total_entries = viewer.sidebar().entries().len().max(1);
    let content_height = total_entries.min(max_content_height);
    viewer.fit_sidebar(content_height);

    let sidebar = viewer.sidebar();
    let window_height = (content_height + 4) as u32;
    let start_col = 1u16;
    let mut row = (header + rows_available.saturating_sub(window_height) / 2) as u16;
    let writer = renderer.writer();
    let border = format!("+{}+", "-".repeat(inner_width));

    print_inverted(writer, start_col, row, &border)?;
    row = row.saturating_add(1);
    let heading = truncate_with_ellipsis(heading, inner_width);
    print_inverted(writer, start_col, row, &format!("|{}|", heading))?;
    row = row.saturating_add(1);
    print_inverted(writer, start_col, row, &format!("|{}|", "-".repeat(inner_width)))?;
    row = row.saturating_add(1);

    let start = sidebar.scroll_offset();
    let end = (start + content_height).min(sidebar.entries().len());
    for (idx, entry) in sidebar.entries()[start..end].iter().enumerate() {
        let marker = if start + idx == sidebar.selected() {
            '>'
        } else {
            ' '
        };
        let content = truncate_with_ellipsis(format!("{} {}", marker, entry.text), inner_width);
        print_inverted(writer, start_col, row, &format!("|{}|", content))?;
        row = row.saturating_add(1);
    }
    for _ in (end - start)..content_height {
        print_inverted(writer, start_col, row, &format!("|{}|", " ".repeat(inner_width)))?;
        row = row.saturating_add(1);
    }
    print_inverted(writer, start_col, row, &border)
}

fn print_at(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(writer, cursor::MoveTo(col, row), Print(content))?;
    Ok(())
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::NoReverse)
    )?;
    Ok(())
}

/// Pads or cuts `text` to exactly `width` characters.
pub fn truncate_with_ellipsis(text: String, width: usize) -> String {
    let len = text.chars().count();
    if len > width {
        if width <= 3 {
            return text.chars().take(width).collect();
        }
        let mut truncated: String = text.chars().take(width - 3).collect();
        truncated.push_str("...");
        return truncated;
    }
    let mut text = text;
    text.push_str(&" ".repeat(width - len));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(cols: u32, cell: (f32, f32)) -> Screen {
        Screen {
            cols,
            rows: 40,
            cell_width: cell.0,
            cell_height: cell.1,
        }
    }

    fn image(width: u32, height: u32) -> RenderImage {
        RenderImage {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_with_ellipsis("abc".into(), 5), "abc  ");
        assert_eq!(truncate_with_ellipsis("abcdefgh".into(), 6), "abc...");
        assert_eq!(truncate_with_ellipsis("Стр. 12".into(), 7), "Стр. 12");
        assert_eq!(truncate_with_ellipsis("abcdef".into(), 2), "ab");
    }

    #[test]
    fn crop_covers_visible_rows_only() {
        assert_eq!(image_crop(100, 10, 0, 10), SourceCrop { y: 0, height: 100 });
        assert_eq!(image_crop(100, 10, 4, 3), SourceCrop { y: 40, height: 30 });
        assert_eq!(image_crop(100, 3, 2, 1), SourceCrop { y: 66, height: 34 });
    }

    #[test]
    fn columns_follow_aspect_ratio() {
        let square = image(100, 100);
        assert_eq!(card_columns(&square, 10, &screen(80, (8.0, 16.0))), 20);
        assert_eq!(card_columns(&square, 10, &screen(80, (0.0, 0.0))), 20);
        assert_eq!(card_columns(&square, 60, &screen(80, (8.0, 16.0))), 78);
    }

    #[test]
    fn fullscreen_frees_chrome_rows() {
        assert_eq!(viewport_rows(24, false), 22.0);
        assert_eq!(viewport_rows(24, true), 24.0);
        assert_eq!(viewport_rows(1, false), 1.0);
    }

    #[test]
    fn dark_theme_inverts_colour_channels() {
        let source = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![10, 20, 30, 200],
        };
        assert_eq!(inverted(&source).pixels, vec![245, 235, 225, 200]);
    }
}
