use std::env;
use std::path::PathBuf;

/// Longest accepted input line, excluding the newline.
pub const MAX_LINE: usize = 4096;

pub const DEFAULT_PROMPT: &str = "jobsh> ";

/// Settings read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directories searched, in order, for commands that are not found as
    /// given.
    pub search_path: Vec<PathBuf>,
    pub prompt: String,
    pub max_line: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search_path: Vec::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            max_line: MAX_LINE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let search_path = env::var_os("PATH")
            .map(|path| parse_search_path(&path.to_string_lossy()))
            .unwrap_or_default();
        let prompt = env::var("JOBSH_PROMPT").unwrap_or_else(|_| DEFAULT_PROMPT.to_string());
        Config {
            search_path,
            prompt,
            ..Config::default()
        }
    }
}

/// Splits a colon-separated directory list, skipping empty entries.
pub fn parse_search_path(path: &str) -> Vec<PathBuf> {
    path.split(':')
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .collect()
}
