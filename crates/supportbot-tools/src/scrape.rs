use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scrape_core::{Document, NodeId, NodeKind};
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Written { path: PathBuf, bytes: usize },
    /// Target exists and overwriting was disabled.
    Skipped { path: PathBuf },
    /// The page yielded no visible text; nothing was written.
    Empty,
}

/// Fetches a page and saves its visible text as the corpus file.
///
/// HTML is parsed with `scrape-core` on a blocking worker. Visible text is every
/// text node outside `script`, `style`, `noscript` and `template`, one line per
/// block element. An optional selector narrows extraction to matched elements.
#[derive(Debug)]
pub struct Scraper {
    client: reqwest::Client,
    selector: Option<String>,
    max_body_bytes: usize,
}

impl Scraper {
    #[must_use]
    pub fn new(config: &ScrapeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .redirect(reqwest::redirect::Policy::limited(3))
            .user_agent(concat!("supportbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("failed to build scrape client, using defaults: {e}");
                reqwest::Client::new()
            });

        Self {
            client,
            selector: config.selector.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Scrape `url` into `directory/filename`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] on an invalid URL, a failed or non-2xx fetch,
    /// extraction failure, or a failed write. Errors are logged before return.
    pub async fn scrape(
        &self,
        url: &str,
        filename: &str,
        directory: Option<&Path>,
        overwrite: bool,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let result = self.scrape_inner(url, filename, directory, overwrite).await;
        if let Err(e) = &result {
            tracing::error!("scraping {url} failed: {e}");
        }
        result
    }

    async fn scrape_inner(
        &self,
        url: &str,
        filename: &str,
        directory: Option<&Path>,
        overwrite: bool,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let url = validate_url(url)?;

        tracing::info!("extracting text from {url}");
        let html = self.fetch_html(&url).await?;
        let selector = self.selector.clone();
        let text = tokio::task::spawn_blocking(move || extract_text(&html, selector.as_deref()))
            .await
            .map_err(|e| ScrapeError::Parse(e.to_string()))??;
        tracing::info!("extracted text length: {}", text.len());

        if text.trim().is_empty() {
            tracing::warn!("no text was extracted from {url}");
            return Ok(ScrapeOutcome::Empty);
        }

        let path = target_path(filename, directory)?;
        if !overwrite && tokio::fs::try_exists(&path).await? {
            tracing::info!(
                "file already exists and overwrite is disabled: {}",
                path.display()
            );
            return Ok(ScrapeOutcome::Skipped { path });
        }

        write_replacing(&path, &text).await?;
        tracing::info!("content saved to {}", path.display());
        Ok(ScrapeOutcome::Written {
            path,
            bytes: text.len(),
        })
    }

    async fn fetch_html(&self, url: &Url) -> Result<String, ScrapeError> {
        let resp = self.client.get(url.clone()).send().await?;

        if !resp.status().is_success() {
            return Err(ScrapeError::Http {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        if let Some(len) = resp.content_length()
            && usize::try_from(len).unwrap_or(usize::MAX) > self.max_body_bytes
        {
            return Err(ScrapeError::BodyTooLarge {
                size: usize::try_from(len).unwrap_or(usize::MAX),
                max: self.max_body_bytes,
            });
        }

        let bytes = resp.bytes().await?;
        if bytes.len() > self.max_body_bytes {
            return Err(ScrapeError::BodyTooLarge {
                size: bytes.len(),
                max: self.max_body_bytes,
            });
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn validate_url(raw: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(raw).map_err(|e| ScrapeError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ScrapeError::InvalidUrl {
            url: raw.to_owned(),
            reason: format!("scheme not allowed: {other}"),
        }),
    }
}

/// Elements whose text is never visible.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that continue the current line instead of starting a new one.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "i", "kbd", "label",
    "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

/// Visible text of the whole document, or of the elements matched by `selector`.
fn extract_text(html: &str, selector: Option<&str>) -> Result<String, ScrapeError> {
    let soup = scrape_core::Soup::parse(html);
    let doc = soup.document();
    let mut out = TextLines::default();

    match selector.map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            if let Some(root) = doc.root() {
                collect_visible(doc, root, &mut out);
            }
        }
        Some(selector) => {
            let tags = soup
                .find_all(selector)
                .map_err(|e| ScrapeError::Parse(format!("invalid selector {selector:?}: {e}")))?;
            let matched: HashSet<NodeId> = tags.iter().map(scrape_core::Tag::node_id).collect();
            for tag in &tags {
                // nested matches are already covered by their outermost match
                if tag.parents().any(|p| matched.contains(&p.node_id())) {
                    continue;
                }
                collect_visible(doc, tag.node_id(), &mut out);
            }
        }
    }

    out.flush();
    Ok(out.lines.join("\n"))
}

#[derive(Default)]
struct TextLines {
    lines: Vec<String>,
    current: String,
}

impl TextLines {
    fn flush(&mut self) {
        let line = normalize_whitespace(&self.current);
        self.current.clear();
        if line.is_empty() || self.lines.last() == Some(&line) {
            return;
        }
        self.lines.push(line);
    }
}

fn collect_visible(doc: &Document, id: NodeId, out: &mut TextLines) {
    let Some(node) = doc.get(id) else { return };

    match &node.kind {
        NodeKind::Text { content } => out.current.push_str(content),
        NodeKind::Element { .. } => {
            let name = node.kind.tag_name().unwrap_or_default().to_ascii_lowercase();
            if HIDDEN_TAGS.contains(&name.as_str()) {
                return;
            }
            let block = !INLINE_TAGS.contains(&name.as_str());
            if block {
                out.flush();
            }
            for child in doc.children(id) {
                collect_visible(doc, child, out);
            }
            if block {
                out.flush();
            }
        }
        NodeKind::Comment { .. } => {}
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn target_path(filename: &str, directory: Option<&Path>) -> Result<PathBuf, ScrapeError> {
    let name = Path::new(filename);
    if filename.trim().is_empty() || name.file_name() != Some(name.as_os_str()) {
        return Err(ScrapeError::InvalidFilename(filename.to_owned()));
    }
    let dir = match directory {
        Some(d) if !d.as_os_str().is_empty() => std::path::absolute(d)?,
        _ => std::env::current_dir()?,
    };
    Ok(dir.join(name))
}

/// Write to a temporary sibling and rename it over `path`.
async fn write_replacing(path: &Path, text: &str) -> Result<(), ScrapeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    tokio::fs::write(&tmp, text).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const PAGE: &str = "<html><head><title>Beem</title><script>var x = 1;</script></head>\
        <body><h1>Smart   Wallet</h1><p>Get cash with\n Everdraft.</p>\
        <ul><li>Taxes</li><li>Taxes</li><li>Budget</li></ul><div>Footer note</div></body></html>";

    fn scraper() -> Scraper {
        Scraper::new(&ScrapeConfig::default())
    }

    async fn serve(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("content-type", "text/html")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;
        server
    }

    // --- validate_url ---

    #[test]
    fn https_and_http_accepted() {
        assert!(validate_url("https://trybeem.com/").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/").is_ok());
    }

    #[test]
    fn ftp_rejected() {
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn unparsable_rejected() {
        assert!(matches!(
            validate_url("not a url"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
    }

    // --- extract_text ---

    const DIV_PAGE: &str = "<html><body><div class=\"hero\">Get instant cash with Everdraft</div>\
        <div><span>File taxes for free</span> <a href=\"/plan\">Budget planner</a></div>\
        <section><button>Join Beem</button></section></body></html>";

    #[test]
    fn extracts_visible_text_in_order() {
        let text = extract_text(PAGE, None).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Beem",
                "Smart Wallet",
                "Get cash with Everdraft.",
                "Taxes",
                "Budget",
                "Footer note"
            ]
        );
        assert!(!text.contains("var x"));
    }

    #[test]
    fn text_outside_semantic_tags_is_kept() {
        let text = extract_text(DIV_PAGE, None).unwrap();
        assert_eq!(
            text,
            "Get instant cash with Everdraft\nFile taxes for free Budget planner\nJoin Beem"
        );
    }

    #[test]
    fn hidden_elements_dropped() {
        let html = "<body><style>p { color: red }</style><noscript>Enable JS</noscript>\
            <template><p>row</p></template><p>Shown</p><script>track()</script></body>";
        assert_eq!(extract_text(html, None).unwrap(), "Shown");
    }

    #[test]
    fn inline_elements_stay_on_one_line() {
        let text = extract_text("<p>Hello <b>World</b>!</p>", None).unwrap();
        assert_eq!(text, "Hello World!");
    }

    #[test]
    fn selector_narrows_extraction() {
        let html = "<body><nav>Menu</nav><main><p>Body copy</p><div>More</div></main></body>";
        assert_eq!(extract_text(html, Some("main")).unwrap(), "Body copy\nMore");
    }

    #[test]
    fn nested_selector_matches_not_repeated() {
        let html = "<div><p>Outer</p><div><p>Inner</p></div></div>";
        assert_eq!(extract_text(html, Some("div")).unwrap(), "Outer\nInner");
    }

    #[test]
    fn blank_selector_means_whole_document() {
        assert_eq!(extract_text("<div>All</div>", Some("  ")).unwrap(), "All");
    }

    #[test]
    fn consecutive_duplicates_dropped() {
        let text =
            extract_text("<ul><li>Taxes</li><li>Taxes</li><li>Budget</li></ul>", Some("li")).unwrap();
        assert_eq!(text, "Taxes\nBudget");
    }

    #[test]
    fn whitespace_only_elements_dropped() {
        let text = extract_text("<p>  </p><p>A</p>", Some("p")).unwrap();
        assert_eq!(text, "A");
    }

    #[test]
    fn invalid_selector_is_parse_error() {
        assert!(matches!(
            extract_text("<p>x</p>", Some("[[[invalid")),
            Err(ScrapeError::Parse(_))
        ));
    }

    #[test]
    fn normalize_collapses_runs() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
    }

    // --- target_path ---

    #[test]
    fn relative_directory_made_absolute() {
        let path = target_path("beem.txt", Some(Path::new("corpus"))).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("corpus/beem.txt"));
    }

    #[test]
    fn missing_directory_uses_cwd() {
        let path = target_path("beem.txt", None).unwrap();
        assert_eq!(path, std::env::current_dir().unwrap().join("beem.txt"));
    }

    #[test]
    fn filename_with_separator_rejected() {
        assert!(matches!(
            target_path("../beem.txt", None),
            Err(ScrapeError::InvalidFilename(_))
        ));
        assert!(matches!(
            target_path("", None),
            Err(ScrapeError::InvalidFilename(_))
        ));
    }

    // --- scrape ---

    #[tokio::test]
    async fn scrape_writes_file() {
        let server = serve(PAGE, 200).await;
        let dir = tempfile::tempdir().unwrap();

        let outcome = scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap();

        let ScrapeOutcome::Written { path, bytes } = outcome else {
            panic!("expected Written, got {outcome:?}");
        };
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.len(), bytes);
        assert!(content.contains("Everdraft"));
        assert_eq!(path, dir.path().join("beem.txt"));
    }

    #[tokio::test]
    async fn scrape_keeps_div_and_span_copy() {
        let server = serve(DIV_PAGE, 200).await;
        let dir = tempfile::tempdir().unwrap();

        let outcome = scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap();

        assert!(matches!(outcome, ScrapeOutcome::Written { .. }));
        let content = std::fs::read_to_string(dir.path().join("beem.txt")).unwrap();
        assert!(content.contains("Get instant cash with Everdraft"));
        assert!(content.contains("File taxes for free Budget planner"));
    }

    #[tokio::test]
    async fn scrape_overwrites_existing_when_enabled() {
        let server = serve(PAGE, 200).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("beem.txt"), "old").unwrap();

        scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("beem.txt")).unwrap();
        assert!(content.contains("Smart Wallet"));
    }

    #[tokio::test]
    async fn scrape_skips_existing_without_overwrite() {
        let server = serve(PAGE, 200).await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("beem.txt");
        std::fs::write(&target, "old").unwrap();

        let outcome = scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), false)
            .await
            .unwrap();
        assert_eq!(outcome, ScrapeOutcome::Skipped { path: target.clone() });
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
    }

    #[tokio::test]
    async fn empty_page_writes_nothing() {
        let server = serve("<html><body><div>   </div></body></html>", 200).await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("beem.txt");
        std::fs::write(&target, "keep me").unwrap();

        let outcome = scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap();
        assert_eq!(outcome, ScrapeOutcome::Empty);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn http_error_status_is_reported() {
        let server = serve("gone", 404).await;
        let dir = tempfile::tempdir().unwrap();

        let err = scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Http { status: 404, .. }));
        assert!(!dir.path().join("beem.txt").exists());
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let server = serve(PAGE, 200).await;
        let dir = tempfile::tempdir().unwrap();
        let scraper = Scraper::new(&ScrapeConfig {
            max_body_bytes: 16,
            ..ScrapeConfig::default()
        });

        let err = scraper
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::BodyTooLarge { max: 16, .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scraper()
            .scrape("http://127.0.0.1:1/", "beem.txt", Some(dir.path()), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Fetch(_)));
    }

    #[tokio::test]
    async fn no_temporary_files_left_behind() {
        let server = serve(PAGE, 200).await;
        let dir = tempfile::tempdir().unwrap();
        scraper()
            .scrape(&server.uri(), "beem.txt", Some(dir.path()), true)
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["beem.txt".to_owned()]);
    }
}
