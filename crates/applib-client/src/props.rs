//! Client-local key/value preferences.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LEFT_SPLIT_PERCENT: &str = "left-split-percent";
pub const LEFT_COLLAPSED: &str = "left-collapsed";
pub const DEFAULT_LEFT_PERCENT: f64 = 25.0;

/// A left pane narrower than this (percent) counts as collapsed.
const COLLAPSED_BELOW: f64 = 3.0;

#[derive(Debug, thiserror::Error)]
pub enum PropsError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize props: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Flat string store. Missing keys read as `""`.
///
/// When backed by a file, every `set` rewrites the whole file through a
/// temp file and rename.
#[derive(Debug, Clone, Default)]
pub struct ClientProps {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl ClientProps {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing or unreadable file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!("Corrupt client props {}: {}. Using defaults.", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("Could not read client props {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            values,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> Result<(), PropsError> {
        self.values.insert(key.to_string(), value.to_string());
        match &self.path {
            Some(path) => save_atomic(path, &self.values),
            None => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn save_atomic(path: &Path, values: &BTreeMap<String, String>) -> Result<(), PropsError> {
    let io = |source| PropsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(values)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io)?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(format!(".tmp.{}", std::process::id()));
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, json).map_err(io)?;
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        io(e)
    })
}

/// Leading decimal number of `s`, or `default` when there is none.
///
/// `"24.5%"` parses as `24.5`.
pub fn parse_float_or(s: &str, default: f64) -> f64 {
    let s = s.trim_start();
    (1..=s.len())
        .rev()
        .filter(|&end| s.is_char_boundary(end))
        .find_map(|end| s[..end].parse::<f64>().ok())
        .filter(|v| !v.is_nan())
        .unwrap_or(default)
}

/// `true`/`t`/`0` are true, `false`/`f`/`1` are false (case-insensitive);
/// anything else yields `default`.
pub fn parse_bool_or(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "0" => true,
        "false" | "f" | "1" => false,
        _ => default,
    }
}

/// Persisted left/right split of the main window.
pub struct SplitLayout;

impl SplitLayout {
    /// `[left, right]` percentages to open with.
    pub fn initial_sizes(props: &ClientProps) -> [f64; 2] {
        if parse_bool_or(props.get(LEFT_COLLAPSED), false) {
            return [0.0, 100.0];
        }
        let left = Self::remembered_left(props);
        [left, 100.0 - left]
    }

    /// Gutter double-click: collapse the left pane, or restore it to the
    /// remembered width. Returns the new sizes.
    pub fn toggle(props: &mut ClientProps, current: [f64; 2]) -> Result<[f64; 2], PropsError> {
        if current[0] < COLLAPSED_BELOW {
            let left = Self::remembered_left(props);
            props.set(LEFT_COLLAPSED, "false")?;
            Ok([left, 100.0 - left])
        } else {
            props.set(LEFT_SPLIT_PERCENT, current[0])?;
            props.set(LEFT_COLLAPSED, "true")?;
            Ok([0.0, 100.0])
        }
    }

    /// Remember the width after a drag, unless the pane was dragged shut.
    pub fn drag_end(props: &mut ClientProps, sizes: [f64; 2]) -> Result<(), PropsError> {
        if sizes[0] >= COLLAPSED_BELOW {
            props.set(LEFT_SPLIT_PERCENT, sizes[0])?;
        }
        Ok(())
    }

    fn remembered_left(props: &ClientProps) -> f64 {
        parse_float_or(props.get(LEFT_SPLIT_PERCENT), DEFAULT_LEFT_PERCENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_keys_read_empty() {
        let props = ClientProps::in_memory();
        assert_eq!(props.get("anything"), "");
    }

    #[test]
    fn file_backed_props_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("props.json");

        let mut props = ClientProps::load(&path);
        props.set("theme", "dark").unwrap();
        props.set(LEFT_SPLIT_PERCENT, 31.5).unwrap();

        let reloaded = ClientProps::load(&path);
        assert_eq!(reloaded.get("theme"), "dark");
        assert_eq!(reloaded.get(LEFT_SPLIT_PERCENT), "31.5");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn corrupt_file_yields_empty_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("props.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(ClientProps::load(&path).iter().count(), 0);
    }

    #[test]
    fn float_parsing() {
        assert_eq!(parse_float_or("24.5", 1.0), 24.5);
        assert_eq!(parse_float_or("  12px", 1.0), 12.0);
        assert_eq!(parse_float_or("", 25.0), 25.0);
        assert_eq!(parse_float_or("wide", 25.0), 25.0);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool_or("TRUE", false));
        assert!(parse_bool_or("t", false));
        assert!(parse_bool_or("0", false));
        assert!(!parse_bool_or("False", true));
        assert!(!parse_bool_or("1", true));
        assert!(parse_bool_or("", true));
        assert!(!parse_bool_or("maybe", false));
    }

    #[test]
    fn split_defaults_and_collapse_cycle() {
        let mut props = ClientProps::in_memory();
        assert_eq!(SplitLayout::initial_sizes(&props), [25.0, 75.0]);

        let collapsed = SplitLayout::toggle(&mut props, [40.0, 60.0]).unwrap();
        assert_eq!(collapsed, [0.0, 100.0]);
        assert_eq!(props.get(LEFT_COLLAPSED), "true");
        assert_eq!(SplitLayout::initial_sizes(&props), [0.0, 100.0]);

        let restored = SplitLayout::toggle(&mut props, collapsed).unwrap();
        assert_eq!(restored, [40.0, 60.0]);
        assert_eq!(SplitLayout::initial_sizes(&props), [40.0, 60.0]);
    }

    #[test]
    fn drag_end_ignores_collapsed_widths() {
        let mut props = ClientProps::in_memory();
        SplitLayout::drag_end(&mut props, [30.0, 70.0]).unwrap();
        SplitLayout::drag_end(&mut props, [1.0, 99.0]).unwrap();
        assert_eq!(props.get(LEFT_SPLIT_PERCENT), "30");
    }
}
