//! User interface rendering and input handling.
//!
//! This module provides all UI-related functionality:
//!
//! - **renderer**: draws the session region and status bar
//! - **surface**: binds the session buffer to a terminal region
//! - **keymapper**: keyboard input to transport byte sequence mapping

pub mod keymapper;
pub mod renderer;
pub mod surface;

pub use keymapper::{KeyMapper, TermModes};
pub use renderer::{Renderer, StatusLine};
pub use surface::SurfaceAdapter;
