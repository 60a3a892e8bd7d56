#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid file name: {0:?}")]
    InvalidFilename(String),

    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("response too large: {size} bytes (max: {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("text extraction failed: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
