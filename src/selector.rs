// Signature selection for Sigil
// Resolves a selector string (literal file, directory, or pattern) to the
// signature files it names on disk

use std::collections::HashSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use regex::Regex;
use walkdir::WalkDir;

/// File extension of signature files.
pub const SIGN_EXT: &str = "yaml";

/// Sentinel selector meaning "everything in the default store".
pub const DEFAULT_SELECTOR: &str = "**";

/// Persistent store providing the default signature list.
pub trait SignStore {
    fn list_defaults(&self, query: &str) -> Vec<String>;
}

/// Base-name matching strategy, chosen once per selection call.
///
/// A base pattern that fails to compile as a regex is not an error:
/// matching degrades to plain containment on the base name.
#[derive(Debug)]
enum MatchStrategy {
    Pattern(Regex),
    Substring(String),
}

impl MatchStrategy {
    fn for_pattern(base: &str) -> Self {
        match Regex::new(base) {
            Ok(re) => MatchStrategy::Pattern(re),
            Err(_) => MatchStrategy::Substring(base.to_string()),
        }
    }

    fn matches(&self, base_name: &str) -> bool {
        match self {
            MatchStrategy::Pattern(re) => re.is_match(base_name),
            MatchStrategy::Substring(pattern) => base_name.contains(pattern),
        }
    }
}

/// Select signature files by selector, deduplicated in first-seen order.
///
/// The `**` sentinel returns the default store's list verbatim.
pub fn select_signs(store: &dyn SignStore, selector: &str) -> Vec<String> {
    if selector == DEFAULT_SELECTOR {
        return store.list_defaults("");
    }
    let mut signs = Vec::new();
    let mut seen = HashSet::new();
    for sign in single_sign(selector.trim()) {
        if seen.insert(sign.clone()) {
            signs.push(sign);
        }
    }
    signs
}

/// Select signature files by a single selector.
///
/// Misses and malformed selectors yield an empty list, never an error.
pub fn single_sign(selector: &str) -> Vec<String> {
    let mut selector = normalize_path(selector);

    // literal file selector
    if selector.ends_with(&format!(".{SIGN_EXT}")) && !selector.contains('*') {
        if Path::new(&selector).is_file() {
            return vec![selector];
        }
        return Vec::new();
    }

    // a folder selects everything underneath it
    if Path::new(&selector).is_dir() {
        selector = Path::new(&selector)
            .join(".*")
            .to_string_lossy()
            .into_owned();
    }

    let mut signs = Vec::new();
    if selector.contains('*') && (selector.contains('/') || selector.contains(MAIN_SEPARATOR)) {
        let pattern = PathBuf::from(&selector);
        let base_select = pattern
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = pattern
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if base_select == "*" {
            return sign_files(&dir);
        }
        let strategy = MatchStrategy::for_pattern(&base_select);
        for sign_file in sign_files(&dir) {
            let base_sign = Path::new(&sign_file)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if strategy.matches(&base_sign) {
                signs.push(sign_file);
            }
        }
    }
    signs
}

/// Recursively list signature files under `dir`, deterministically ordered.
pub fn sign_files(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == SIGN_EXT))
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect()
}

/// Expand a leading `~` to the user's home directory.
fn normalize_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{}", home.to_string_lossy(), rest);
        }
    }
    path.to_string()
}
