//! Surface adapter
//!
//! Binds the session's buffer to a concrete region of the local terminal
//! and keeps that binding correct across layout changes. Owns no state
//! beyond the active handle; attach, detach and fit are all delegated to
//! the session.

use crate::core::session::{Session, SessionError, SurfaceHandle, SurfaceId};

/// Reserved rows below the session region.
pub const STATUS_BAR_ROWS: u16 = 1;

/// Maps terminal geometry to the session's render region.
pub struct SurfaceAdapter {
    active: Option<SurfaceHandle>,
    next_id: SurfaceId,
    status_bar: bool,
}

impl SurfaceAdapter {
    pub fn new(status_bar: bool) -> Self {
        Self {
            active: None,
            next_id: 1,
            status_bar,
        }
    }

    /// Compute the region for the current terminal size. The region keeps
    /// its identity across resizes; only the rectangle moves.
    fn layout(&mut self, cols: u16, rows: u16) -> SurfaceHandle {
        let reserved = if self.status_bar { STATUS_BAR_ROWS } else { 0 };
        let id = match self.active {
            Some(handle) => handle.id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        let handle = SurfaceHandle {
            id,
            x: 0,
            y: 0,
            width: cols,
            height: rows.saturating_sub(reserved).max(1),
        };
        self.active = Some(handle);
        handle
    }

    /// Attach the session to the region for the given terminal size.
    pub fn mount(&mut self, session: &mut Session, cols: u16, rows: u16) -> Result<(), SessionError> {
        let handle = self.layout(cols, rows);
        session.attach_surface(handle)
    }

    /// Detach without disturbing buffer or transport.
    pub fn unmount(&mut self, session: &mut Session) {
        session.detach_surface();
        self.active = None;
    }

    /// React to a terminal resize: refresh the recorded geometry and fit.
    pub fn on_resize(&mut self, session: &mut Session, cols: u16, rows: u16) {
        let handle = self.layout(cols, rows);
        // Same surface identity, so this only refreshes the rectangle.
        let _ = session.attach_surface(handle);
        session.fit(handle);
    }

    pub fn active(&self) -> Option<SurfaceHandle> {
        self.active
    }

    /// Row of the status bar, if any.
    pub fn status_row(&self, rows: u16) -> Option<u16> {
        self.status_bar.then(|| rows.saturating_sub(1))
    }
}
