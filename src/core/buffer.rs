//! Emulation buffer
//!
//! Thin wrapper around the external `vt100` parser. Escape-sequence
//! handling, the cell grid and scrollback storage all belong to `vt100`;
//! this module adds the two things the session needs on top: viewport
//! position bookkeeping in both directions (lines-above-bottom for the
//! parser, top-based offsets for the scroll tracker) and surface-binding
//! state for the attach contract.

use thiserror::Error;

use super::session::SurfaceId;

#[derive(Error, Debug, PartialEq)]
pub enum BindError {
    #[error("buffer is already bound to surface {0}")]
    AlreadyBound(SurfaceId),
}

/// The terminal emulation buffer, alive from `initialize` to `teardown`
/// regardless of how often surfaces come and go.
pub struct EmulationBuffer {
    parser: vt100::Parser,
    bound_to: Option<SurfaceId>,
    binds: u32,
}

impl EmulationBuffer {
    pub fn new(rows: u16, cols: u16, scrollback: usize) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, scrollback),
            bound_to: None,
            binds: 0,
        }
    }

    /// Feed a chunk of remote output.
    pub fn write_chunk(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    /// Resize the grid. Rows track the surface, columns are policy.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.parser.set_size(rows, cols);
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    pub fn visible_rows(&self) -> u16 {
        self.parser.screen().size().0
    }

    /// Number of lines that have scrolled off into history.
    ///
    /// `vt100` exposes the scrollback position but not its length, so the
    /// length is probed by clamping a saturating seek and restoring the
    /// prior position. The parser only moves an offset; no cell data is
    /// touched.
    pub fn scrollback_len(&mut self) -> usize {
        let current = self.parser.screen().scrollback();
        self.parser.set_scrollback(usize::MAX);
        let len = self.parser.screen().scrollback();
        self.parser.set_scrollback(current);
        len
    }

    /// Current viewport position as lines above the live bottom.
    pub fn scroll_position(&self) -> usize {
        self.parser.screen().scrollback()
    }

    /// Seek the viewport to `lines_above_bottom`, clamped to history.
    pub fn set_scroll_position(&mut self, lines_above_bottom: usize) {
        self.parser.set_scrollback(lines_above_bottom);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.parser.set_scrollback(0);
    }

    /// Viewport offset from the top of history, the scroll tracker's
    /// coordinate system.
    pub fn offset_from_top(&mut self) -> usize {
        let len = self.scrollback_len();
        len.saturating_sub(self.scroll_position())
    }

    /// History plus the visible grid, in lines.
    pub fn total_lines(&mut self) -> usize {
        self.scrollback_len() + self.visible_rows() as usize
    }

    /// Claim the buffer for a surface. Binding to the surface it is
    /// already on is a no-op; binding while bound elsewhere is refused so
    /// the caller can clear and retry explicitly.
    pub fn bind(&mut self, surface: SurfaceId) -> Result<(), BindError> {
        match self.bound_to {
            Some(current) if current == surface => Ok(()),
            Some(current) => Err(BindError::AlreadyBound(current)),
            None => {
                self.bound_to = Some(surface);
                self.binds += 1;
                Ok(())
            }
        }
    }

    /// Drop the surface claim. Rendering state is untouched.
    pub fn release(&mut self) {
        self.bound_to = None;
    }

    #[allow(dead_code)]
    pub fn bound_surface(&self) -> Option<SurfaceId> {
        self.bound_to
    }

    #[cfg(test)]
    pub fn bind_count(&self) -> u32 {
        self.binds
    }
}
