//! Corpus acquisition: scrape a web page into a UTF-8 text file.

pub mod config;
pub mod error;
pub mod scrape;

pub use config::ScrapeConfig;
pub use error::ScrapeError;
pub use scrape::{ScrapeOutcome, Scraper};
