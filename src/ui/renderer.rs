//! Terminal renderer using crossterm
//!
//! Draws the emulation buffer into its surface region and a one-line
//! status bar underneath. Rendering is line-based inside a synchronized
//! update, which is plenty for a single session and avoids flicker.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::config::ColorScheme;
use crate::core::conn::ConnectionState;
use crate::core::session::{Session, SurfaceHandle};
use crate::snippets::SnippetSelector;

/// Everything the status bar shows.
pub struct StatusLine<'a> {
    pub status: ConnectionState,
    pub endpoint: &'a str,
    pub scrolled_lines: usize,
}

/// Cell attributes currently applied to the output stream.
#[derive(Clone, Copy, PartialEq)]
struct PenState {
    fg: Color,
    bg: Color,
    bold: bool,
    italic: bool,
    underline: bool,
    inverse: bool,
}

impl Default for PenState {
    fn default() -> Self {
        Self {
            fg: Color::Reset,
            bg: Color::Reset,
            bold: false,
            italic: false,
            underline: false,
            inverse: false,
        }
    }
}

fn vt_color(color: vt100::Color) -> Color {
    match color {
        vt100::Color::Default => Color::Reset,
        vt100::Color::Idx(i) => Color::AnsiValue(i),
        vt100::Color::Rgb(r, g, b) => Color::Rgb { r, g, b },
    }
}

/// Terminal renderer
pub struct Renderer {
    colors: ColorScheme,
    initialized: bool,
}

impl Renderer {
    pub fn new(colors: ColorScheme) -> Self {
        Self {
            colors,
            initialized: false,
        }
    }

    /// Current terminal size as (cols, rows)
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            crossterm::event::EnableMouseCapture,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;

        // Synchronized output mode (reduces flicker)
        write!(stdout, "\x1b[?2026h")?;
        stdout.flush()?;

        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show, EnableLineWrap);
        let _ = execute!(stdout, crossterm::event::DisableMouseCapture);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();

        terminal::disable_raw_mode()?;
        println!();
        Ok(())
    }

    /// Render the session region and status bar.
    pub fn render(
        &mut self,
        session: &mut Session,
        region: SurfaceHandle,
        status_row: Option<u16>,
        status: &StatusLine,
    ) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        if session.take_needs_clear() {
            queue!(out, ResetColor, Clear(ClearType::All))?;
        }

        self.render_region(&mut out, session, region)?;
        if let Some(row) = status_row {
            self.render_status_bar(&mut out, row, region.width, status)?;
        }
        self.place_cursor(&mut out, session, region)?;

        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    /// Render with the snippet selector overlaid on the region.
    pub fn render_with_selector(
        &mut self,
        session: &mut Session,
        region: SurfaceHandle,
        status_row: Option<u16>,
        status: &StatusLine,
        selector: &SnippetSelector,
    ) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        if session.take_needs_clear() {
            queue!(out, ResetColor, Clear(ClearType::All))?;
        }

        self.render_region(&mut out, session, region)?;
        if let Some(row) = status_row {
            self.render_status_bar(&mut out, row, region.width, status)?;
        }
        self.render_selector(&mut out, region, selector)?;

        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    /// Draw the buffer grid into the region, cropping rows wider than the
    /// region. The grid is deliberately wider than any surface (fixed
    /// column policy), so the crop is the normal case, not an edge case.
    fn render_region<W: Write>(
        &self,
        out: &mut W,
        session: &Session,
        region: SurfaceHandle,
    ) -> io::Result<()> {
        let Some(screen) = session.screen() else {
            return Ok(());
        };
        let (grid_rows, grid_cols) = screen.size();
        let rows = region.height.min(grid_rows);

        let mut pen = PenState::default();
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;

        for row in 0..rows {
            queue!(out, MoveTo(region.x, region.y + row))?;
            let mut printed: u16 = 0;
            let mut col: u16 = 0;

            while col < grid_cols && printed < region.width {
                let Some(cell) = screen.cell(row, col) else {
                    break;
                };
                if cell.is_wide_continuation() {
                    col += 1;
                    continue;
                }

                let width = if cell.is_wide() { 2 } else { 1 };
                if printed + width > region.width {
                    break;
                }

                let wanted = PenState {
                    fg: vt_color(cell.fgcolor()),
                    bg: vt_color(cell.bgcolor()),
                    bold: cell.bold(),
                    italic: cell.italic(),
                    underline: cell.underline(),
                    inverse: cell.inverse(),
                };
                if wanted != pen {
                    self.apply_pen(out, &wanted)?;
                    pen = wanted;
                }

                let contents = cell.contents();
                if contents.is_empty() {
                    write!(out, " ")?;
                } else {
                    write!(out, "{}", contents)?;
                }
                printed += width;
                col += width;
            }

            // Pad the remainder of the region row
            if pen != PenState::default() {
                queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
                pen = PenState::default();
            }
            while printed < region.width {
                write!(out, " ")?;
                printed += 1;
            }
        }

        Ok(())
    }

    fn apply_pen<W: Write>(&self, out: &mut W, pen: &PenState) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;
        if pen.bold {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if pen.italic {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if pen.underline {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if pen.inverse {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        queue!(out, SetForegroundColor(pen.fg), SetBackgroundColor(pen.bg))?;
        Ok(())
    }

    fn render_status_bar<W: Write>(
        &self,
        out: &mut W,
        row: u16,
        width: u16,
        status: &StatusLine,
    ) -> io::Result<()> {
        let accent = match status.status {
            ConnectionState::Connected => self.colors.status_connected,
            ConnectionState::Connecting => self.colors.status_connecting,
            ConnectionState::Disconnected | ConnectionState::Error => self.colors.status_error,
        };

        let mut line = format!(" {} ", status.status.as_str());
        let mut tail = format!(" {} ", status.endpoint);
        if status.scrolled_lines > 0 {
            tail.push_str(&format!("[^ {} lines] ", status.scrolled_lines));
        }
        if status.status != ConnectionState::Connected {
            tail.push_str("Ctrl+R reconnect ");
        }

        queue!(
            out,
            MoveTo(0, row),
            SetAttribute(Attribute::Reset),
            SetBackgroundColor(accent.to_crossterm()),
            SetForegroundColor(self.colors.status_bar_fg.to_crossterm())
        )?;
        write!(out, "{}", line)?;

        queue!(
            out,
            SetBackgroundColor(self.colors.status_bar_bg.to_crossterm()),
            SetForegroundColor(self.colors.status_bar_fg.to_crossterm())
        )?;
        line.push_str(&tail);
        write!(out, "{}", tail)?;
        let used = line.chars().count() as u16;
        for _ in used..width {
            write!(out, " ")?;
        }
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    /// Place the hardware cursor on the buffer cursor while tracking live
    /// output; hide it while reading history.
    fn place_cursor<W: Write>(
        &self,
        out: &mut W,
        session: &Session,
        region: SurfaceHandle,
    ) -> io::Result<()> {
        let Some(screen) = session.screen() else {
            return Ok(());
        };
        if session.scroll_position() == 0 && !screen.hide_cursor() {
            let (cursor_row, cursor_col) = screen.cursor_position();
            if cursor_row < region.height && cursor_col < region.width {
                queue!(
                    out,
                    MoveTo(region.x + cursor_col, region.y + cursor_row),
                    Show
                )?;
            }
        }
        Ok(())
    }

    fn render_selector<W: Write>(
        &self,
        out: &mut W,
        region: SurfaceHandle,
        selector: &SnippetSelector,
    ) -> io::Result<()> {
        let width = region.width.saturating_sub(4).min(60).max(20);
        let inner = width.saturating_sub(2) as usize;
        let x = region.x + 2;
        let mut y = region.y + 1;

        let border = self.colors.selector_border.to_crossterm();
        let bg = self.colors.selector_bg.to_crossterm();
        let fg = self.colors.selector_fg.to_crossterm();

        queue!(
            out,
            SetAttribute(Attribute::Reset),
            SetForegroundColor(border),
            SetBackgroundColor(bg),
            MoveTo(x, y)
        )?;
        let title = format!(" Snippets: {} ", selector.query());
        write!(out, "+{:-<1$}+", truncate_to(&title, inner), inner)?;
        y += 1;

        for (number, label, selected) in selector.visible_items() {
            queue!(out, MoveTo(x, y), SetForegroundColor(border))?;
            write!(out, "|")?;
            if selected {
                queue!(
                    out,
                    SetBackgroundColor(self.colors.selector_selected_bg.to_crossterm()),
                    SetForegroundColor(self.colors.selector_selected_fg.to_crossterm())
                )?;
            } else {
                queue!(out, SetBackgroundColor(bg), SetForegroundColor(fg))?;
            }
            let entry = format!("{} {}", number + 1, label);
            write!(out, "{:<1$}", truncate_to(&entry, inner), inner)?;
            queue!(out, SetBackgroundColor(bg), SetForegroundColor(border))?;
            write!(out, "|")?;
            y += 1;
        }

        queue!(out, MoveTo(x, y), SetForegroundColor(border))?;
        write!(out, "+{:-<1$}+", "", inner)?;
        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }
}

/// Truncate to a display width, respecting wide characters.
fn truncate_to(text: &str, max_width: usize) -> String {
    let mut result = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > max_width {
            break;
        }
        width += w;
        result.push(ch);
    }
    result
}
