//! Configuration management for wsterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.wsterm/config.toml`
//! - Reconnect policy and fixed-width grid settings
//! - Status bar and selector colors
//!
//! # Configuration File
//!
//! The configuration file is located at `~/.wsterm/config.toml`:
//!
//! ```toml
//! # Endpoint of the remote session (http/https or ws/wss)
//! endpoint = "http://localhost:8080/claude/ws"
//!
//! # Fixed grid width; wide output crops instead of wrapping
//! cols = 200
//!
//! # Scrollback lines kept in the emulation buffer
//! scrollback = 10000
//!
//! # Send {cols, rows} resize notices to the remote process
//! send_resize = false
//!
//! [reconnect]
//! base_delay_ms = 3000
//! multiplier = 1.5
//! max_attempts = 10
//!
//! [status_bar]
//! visible = true
//! ```

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::conn::ReconnectPolicy;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote endpoint URL
    pub endpoint: Option<String>,
    /// Fixed grid width
    pub cols: u16,
    /// Scrollback lines
    pub scrollback: usize,
    /// Whether to send resize notices to the remote process
    pub send_resize: bool,
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
    /// Status bar settings
    pub status_bar: StatusBarConfig,
    /// Colors
    pub colors: ColorScheme,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            cols: 200,
            scrollback: 10000,
            send_resize: false,
            reconnect: ReconnectConfig::default(),
            status_bar: StatusBarConfig::default(),
            colors: ColorScheme::default(),
        }
    }
}

/// Reconnect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 3000,
            multiplier: 1.5,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    pub fn to_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
        }
    }
}

/// Status bar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBarConfig {
    pub visible: bool,
}

impl Default for StatusBarConfig {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Self {
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(config) = toml::from_str(&content) {
                        return config;
                    }
                }
            }
        }
        Self::default()
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        if let Some(home) = home_dir() {
            let wsterm_dir = home.join(".wsterm");
            if !wsterm_dir.exists() {
                let _ = fs::create_dir_all(&wsterm_dir);
            }
            return Some(wsterm_dir.join("config.toml"));
        }
        None
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color scheme definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorScheme {
    // Status bar colors
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_connected: Color,
    pub status_connecting: Color,
    pub status_error: Color,

    // Snippet selector colors
    pub selector_bg: Color,
    pub selector_fg: Color,
    pub selector_selected_bg: Color,
    pub selector_selected_fg: Color,
    pub selector_border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            // Status bar - dark gray background
            status_bar_bg: Color::new(40, 40, 40),
            status_bar_fg: Color::new(255, 255, 255),
            status_connected: Color::new(0, 100, 0),
            status_connecting: Color::new(150, 120, 0),
            status_error: Color::new(140, 30, 30),

            // Snippet selector
            selector_bg: Color::new(0, 0, 139),
            selector_fg: Color::new(255, 255, 255),
            selector_selected_bg: Color::new(255, 255, 255),
            selector_selected_fg: Color::new(0, 0, 0),
            selector_border: Color::new(100, 100, 255),
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
