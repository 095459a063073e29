//! Canned command snippets
//!
//! Provides snippet storage, search, and selection. A confirmed snippet
//! is submitted through the session's programmatic input, exactly as if
//! the user had typed it and pressed Enter.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

/// A single snippet
#[derive(Clone, Debug, Deserialize)]
pub struct Snippet {
    /// Short label shown in the selector
    pub name: String,
    /// The command text submitted on confirm
    pub command: String,
}

/// Snippet file contents (`~/.wsterm/snippets.toml`)
#[derive(Debug, Default, Deserialize)]
struct SnippetFile {
    #[serde(default)]
    snippets: Vec<Snippet>,
}

/// Snippet storage
pub struct SnippetStore {
    entries: Vec<Snippet>,
}

impl SnippetStore {
    /// Load snippets from the default file; missing or malformed files
    /// yield an empty store.
    pub fn load() -> Self {
        let entries = Self::snippets_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| toml::from_str::<SnippetFile>(&content).ok())
            .map(|file| file.snippets)
            .unwrap_or_default();
        Self { entries }
    }

    #[cfg(test)]
    fn from_entries(entries: Vec<Snippet>) -> Self {
        Self { entries }
    }

    fn snippets_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".wsterm").join("snippets.toml"))
    }

    /// Search snippets by name or command (insertion order preserved)
    pub fn search(&self, query: &str) -> Vec<&Snippet> {
        let query_lower = query.to_lowercase();
        self.entries
            .iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&query_lower)
                    || s.command.to_lowercase().contains(&query_lower)
            })
            .collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snippet selector UI state
pub struct SnippetSelector {
    store: SnippetStore,
    query: String,
    /// Filtered results (command strings, labelled)
    results: Vec<(String, String)>,
    selected: usize,
    visible: bool,
    scroll_offset: usize,
    max_visible: usize,
}

impl SnippetSelector {
    pub fn new(store: SnippetStore) -> Self {
        let mut selector = Self {
            store,
            query: String::new(),
            results: Vec::new(),
            selected: 0,
            visible: false,
            scroll_offset: 0,
            max_visible: 10,
        };
        selector.update_results();
        selector
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Show the selector
    pub fn show(&mut self) {
        self.visible = true;
        self.query.clear();
        self.selected = 0;
        self.scroll_offset = 0;
        self.update_results();
    }

    /// Hide the selector
    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Update results based on query
    fn update_results(&mut self) {
        self.results = self
            .store
            .search(&self.query)
            .into_iter()
            .map(|s| (s.name.clone(), s.command.clone()))
            .collect();

        if self.selected >= self.results.len() {
            self.selected = self.results.len().saturating_sub(1);
        }
        self.adjust_scroll();
    }

    /// Add character to query
    pub fn input_char(&mut self, ch: char) {
        self.query.push(ch);
        self.selected = 0;
        self.scroll_offset = 0;
        self.update_results();
    }

    /// Remove last character
    pub fn backspace(&mut self) {
        self.query.pop();
        self.update_results();
    }

    /// Move selection up
    pub fn select_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.adjust_scroll();
        }
    }

    /// Move selection down
    pub fn select_down(&mut self) {
        if !self.results.is_empty() && self.selected + 1 < self.results.len() {
            self.selected += 1;
            self.adjust_scroll();
        }
    }

    /// Select by number (1-9)
    pub fn select_number(&mut self, num: usize) -> Option<String> {
        let index = num.saturating_sub(1) + self.scroll_offset;
        if index < self.results.len() {
            self.selected = index;
            return self.confirm();
        }
        None
    }

    fn adjust_scroll(&mut self) {
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + self.max_visible {
            self.scroll_offset = self.selected - self.max_visible + 1;
        }
    }

    /// Confirm selection, returning the command to inject
    pub fn confirm(&mut self) -> Option<String> {
        if let Some((_, command)) = self.results.get(self.selected).cloned() {
            self.hide();
            return Some(command);
        }
        None
    }

    /// Get visible items for rendering
    /// Returns: (display_index, label, is_selected)
    pub fn visible_items(&self) -> Vec<(usize, String, bool)> {
        self.results
            .iter()
            .enumerate()
            .skip(self.scroll_offset)
            .take(self.max_visible)
            .map(|(idx, (name, command))| {
                let display_idx = idx - self.scroll_offset;
                let label = if name.is_empty() {
                    command.clone()
                } else {
                    format!("{}: {}", name, command)
                };
                (display_idx, label, idx == self.selected)
            })
            .collect()
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SnippetStore {
        SnippetStore::from_entries(vec![
            Snippet {
                name: "status".to_string(),
                command: "git status".to_string(),
            },
            Snippet {
                name: "log".to_string(),
                command: "git log --oneline -20".to_string(),
            },
            Snippet {
                name: "disk".to_string(),
                command: "df -h".to_string(),
            },
        ])
    }

    #[test]
    fn test_search_matches_name_and_command() {
        let store = store();
        assert_eq!(store.search("").len(), 3);
        assert_eq!(store.search("git").len(), 2);
        assert_eq!(store.search("DISK").len(), 1);
        assert!(store.search("nothing").is_empty());
    }

    #[test]
    fn test_filter_and_confirm() {
        let mut selector = SnippetSelector::new(store());
        selector.show();
        selector.input_char('l');
        selector.input_char('o');
        selector.input_char('g');

        assert_eq!(selector.visible_items().len(), 1);
        assert_eq!(selector.confirm(), Some("git log --oneline -20".to_string()));
        assert!(!selector.is_visible());
    }

    #[test]
    fn test_select_number() {
        let mut selector = SnippetSelector::new(store());
        selector.show();
        assert_eq!(selector.select_number(3), Some("df -h".to_string()));
    }

    #[test]
    fn test_backspace_restores_results() {
        let mut selector = SnippetSelector::new(store());
        selector.show();
        selector.input_char('z');
        assert!(selector.visible_items().is_empty());
        selector.backspace();
        assert_eq!(selector.visible_items().len(), 3);
    }

    #[test]
    fn test_parse_snippet_file() {
        let file: SnippetFile = toml::from_str(
            r#"
            [[snippets]]
            name = "build"
            command = "cargo build"
        "#,
        )
        .unwrap();
        assert_eq!(file.snippets.len(), 1);
        assert_eq!(file.snippets[0].command, "cargo build");
    }
}
