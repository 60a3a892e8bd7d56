use std::path::PathBuf;

use serde::Deserialize;

fn default_url() -> String {
    "https://trybeem.com/".into()
}

fn default_filename() -> String {
    "beem.txt".into()
}

fn default_overwrite() -> bool {
    true
}

fn default_scrape_timeout() -> u64 {
    15
}

fn default_max_body_bytes() -> usize {
    4 * 1_048_576
}

/// Corpus acquisition settings (`[scrape]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Target directory; the current directory when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    /// Optional CSS selector narrowing extraction; the whole document when unset.
    #[serde(default)]
    pub selector: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_scrape_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            filename: default_filename(),
            directory: None,
            overwrite: default_overwrite(),
            selector: None,
            timeout: default_scrape_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
