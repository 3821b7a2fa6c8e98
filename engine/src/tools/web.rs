//! Web search and fetch tools
//!
//! `web_search` walks the configured provider cascade (Google Custom Search,
//! then DuckDuckGo's HTML endpoint by default) and returns the first non-empty
//! result set. `fetch_webpage` downloads one page from an allowed domain and
//! reduces it to title plus readable text. `extract_links` lists the links on
//! one page, resolved to absolute URLs.
//!
//! All three tools share one rate window, so together they never exceed
//! `rate_limit_per_minute` requests.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Node, Selector};
use sdk::types::{ToolError, ToolInput, ToolOutput};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ParamKind, ParamSpec, ResearchTool};
use crate::config::WebToolConfig;
use crate::db::MemoryKind;
use crate::rate_limiter::RateWindow;

/// Upper bound on page text handed back to the executor
const MAX_PAGE_CHARS: usize = 20_000;

const DEFAULT_LINKS: usize = 50;
const MAX_LINKS: usize = 200;

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One link found on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub url: String,
}

/// Elements whose text never reaches the reader
const HIDDEN_TAGS: &[&str] = &["head", "title", "script", "style", "noscript", "template", "svg"];

/// Elements that break the text onto a new line
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Parsed selectors for turning HTML into plain text
#[derive(Debug)]
pub struct HtmlExtractor {
    title: Selector,
    links: Selector,
    ddg_result: Selector,
    ddg_link: Selector,
    ddg_snippet: Selector,
}

impl HtmlExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: parse_selector("title")?,
            links: parse_selector("a[href]")?,
            ddg_result: parse_selector(".result")?,
            ddg_link: parse_selector("a.result__a")?,
            ddg_snippet: parse_selector(".result__snippet")?,
        })
    }

    /// Page title, if the document declares one
    pub fn title(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.title)
            .next()
            .map(inline_text)
            .filter(|t| !t.is_empty())
    }

    /// Readable text with scripts, styles and markup removed
    pub fn text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let mut raw = String::new();
        collect_text(document.root_element(), &mut raw);

        raw.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Absolute http(s) links on a page, resolved against `base`, in page order
    pub fn links(&self, html: &str, base: &Url) -> Vec<PageLink> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in document.select(&self.links) {
            let Some(href) = anchor.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty() || href.starts_with('#') {
                continue;
            }
            let Ok(mut url) = base.join(href) else {
                debug!("Skipping unresolvable link: {}", href);
                continue;
            };
            if !matches!(url.scheme(), "http" | "https") {
                continue;
            }
            url.set_fragment(None);
            if seen.insert(url.to_string()) {
                links.push(PageLink {
                    text: inline_text(anchor),
                    url: url.to_string(),
                });
            }
        }
        links
    }

    /// Parse DuckDuckGo's HTML result page
    fn duckduckgo_hits(&self, html: &str, limit: usize) -> Vec<SearchHit> {
        let document = Html::parse_document(html);
        document
            .select(&self.ddg_result)
            .filter_map(|result| {
                let link = result.select(&self.ddg_link).next()?;
                let url = resolve_duckduckgo_href(link.value().attr("href")?)?;
                let snippet = result
                    .select(&self.ddg_snippet)
                    .next()
                    .map(inline_text)
                    .unwrap_or_default();
                Some(SearchHit {
                    title: inline_text(link),
                    url,
                    snippet,
                })
            })
            .take(limit)
            .collect()
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {:?}", css, e))
}

/// Text of an element on one line
fn inline_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if HIDDEN_TAGS.contains(&el.name()) => {}
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    out.push('\n');
                }
                collect_text(child, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<encoded>`
fn resolve_duckduckgo_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Google Custom Search credentials
#[derive(Debug, Clone)]
pub struct GoogleCredentials {
    pub api_key: String,
    pub engine_id: String,
}

impl GoogleCredentials {
    /// Read credentials from the environment variables named in config
    pub fn from_env(config: &WebToolConfig) -> Option<Self> {
        let api_key = std::env::var(&config.google_api_key_env).ok()?;
        let engine_id = std::env::var(&config.google_engine_id_env).ok()?;
        (!api_key.is_empty() && !engine_id.is_empty()).then_some(Self { api_key, engine_id })
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// The web tools, sharing one HTTP client and one rate window
pub struct WebTools {
    pub search: WebSearchTool,
    pub fetch: FetchWebpageTool,
    pub links: ExtractLinksTool,
}

/// Build the web tools around one HTTP client and one rate window
pub fn build_web_tools(config: &WebToolConfig) -> Result<WebTools> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("Failed to build web HTTP client")?;
    let window = Arc::new(RateWindow::per_minute("web", config.rate_limit_per_minute));
    let extractor = Arc::new(HtmlExtractor::new().context("Failed to parse HTML selectors")?);
    let pages = Arc::new(PageFetcher {
        client: client.clone(),
        allowed_domains: config.allowed_domains.clone(),
        window: Arc::clone(&window),
    });

    Ok(WebTools {
        search: WebSearchTool {
            client,
            config: config.clone(),
            google: GoogleCredentials::from_env(config),
            window,
            extractor: Arc::clone(&extractor),
        },
        fetch: FetchWebpageTool {
            pages: Arc::clone(&pages),
            extractor: Arc::clone(&extractor),
        },
        links: ExtractLinksTool { pages, extractor },
    })
}

/// `web_search` tool
pub struct WebSearchTool {
    client: Client,
    config: WebToolConfig,
    google: Option<GoogleCredentials>,
    window: Arc<RateWindow>,
    extractor: Arc<HtmlExtractor>,
}

impl WebSearchTool {
    pub fn with_google_credentials(mut self, credentials: GoogleCredentials) -> Self {
        self.google = Some(credentials);
        self
    }

    async fn search_google(
        &self,
        credentials: &GoogleCredentials,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, String> {
        self.window.acquire().await;

        let num = limit.min(10).to_string();
        let response = self
            .client
            .get(&self.config.google_endpoint)
            .query(&[
                ("key", credentials.api_key.as_str()),
                ("cx", credentials.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let body: GoogleResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body
            .items
            .into_iter()
            .take(limit)
            .map(|item| SearchHit {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect())
    }

    async fn search_duckduckgo(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, String> {
        self.window.acquire().await;

        let response = self
            .client
            .get(&self.config.duckduckgo_endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let html = response.text().await.map_err(|e| e.to_string())?;
        Ok(self.extractor.duckduckgo_hits(&html, limit))
    }

    fn render(query: &str, provider: &str, hits: Vec<SearchHit>) -> ToolOutput {
        let text = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| format!("{}. {} ({})\n{}", i + 1, hit.title, hit.url, hit.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");
        let source = hits
            .iter()
            .take(3)
            .map(|hit| hit.url.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        ToolOutput::json(
            json!({ "query": query, "provider": provider, "results": hits }),
            text,
        )
        .with_source(source)
    }
}

#[async_trait]
impl ResearchTool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return result titles, URLs and snippets."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("query", ParamKind::Text, "Search terms"),
            ParamSpec::optional("limit", ParamKind::Integer, "Maximum number of results (1-20)"),
        ]
    }

    fn record_kind(&self) -> Option<MemoryKind> {
        Some(MemoryKind::DocumentReference)
    }

    async fn execute(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolError> {
        let query = input.param_str("query")?.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParameter("query is empty".to_string()));
        }
        let limit = input
            .param_i64_opt("limit")
            .map(|n| n.clamp(1, 20) as usize)
            .unwrap_or(self.config.results_per_query);

        let mut failures = Vec::new();
        for provider in &self.config.search_providers {
            let result = match provider.as_str() {
                "google" => match &self.google {
                    Some(credentials) => self.search_google(credentials, query, limit).await,
                    None => {
                        debug!("Google search is not configured, skipping");
                        continue;
                    }
                },
                "duckduckgo" => self.search_duckduckgo(query, limit).await,
                other => {
                    warn!("Unknown search provider '{}', skipping", other);
                    continue;
                }
            };

            match result {
                Ok(hits) if !hits.is_empty() => {
                    info!(provider = %provider, results = hits.len(), "Web search succeeded");
                    return Ok(Self::render(query, provider, hits));
                }
                Ok(_) => failures.push(format!("{}: no results", provider)),
                Err(e) => {
                    warn!(provider = %provider, error = %e, "Search provider failed, trying next");
                    failures.push(format!("{}: {}", provider, e));
                }
            }
        }

        Err(ToolError::Execution(if failures.is_empty() {
            "no search provider is configured".to_string()
        } else {
            format!("all search providers failed ({})", failures.join("; "))
        }))
    }
}

/// Downloads single pages from allowed domains under the shared rate window
pub struct PageFetcher {
    client: Client,
    allowed_domains: Vec<String>,
    window: Arc<RateWindow>,
}

impl PageFetcher {
    /// Whether `host` is an allowed domain or a subdomain of one
    fn domain_allowed(&self, host: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let host = host.to_lowercase();
        let host = host.trim_start_matches("www.");
        self.allowed_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{}", d)))
    }

    /// Validate `raw` and return the parsed URL with the page body
    async fn get(&self, raw: &str) -> std::result::Result<(Url, String), ToolError> {
        let raw = raw.trim();
        let url = Url::parse(raw)
            .map_err(|e| ToolError::InvalidParameter(format!("url '{}': {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::InvalidParameter(format!(
                "url scheme '{}' is not http(s)",
                url.scheme()
            )));
        }
        let host = url.host_str().unwrap_or_default().to_string();
        if !self.domain_allowed(&host) {
            warn!("Domain not allowed: {}", host);
            return Err(ToolError::DomainNotAllowed(host));
        }

        self.window.acquire().await;
        info!("Fetching web page: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("request to {} failed: {}", host, e)))?;
        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("unreadable body from {}: {}", url, e)))?;
        Ok((url, html))
    }
}

/// `fetch_webpage` tool
pub struct FetchWebpageTool {
    pages: Arc<PageFetcher>,
    extractor: Arc<HtmlExtractor>,
}

#[async_trait]
impl ResearchTool for FetchWebpageTool {
    fn name(&self) -> &str {
        "fetch_webpage"
    }

    fn description(&self) -> &str {
        "Download a web page and return its title and readable text."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("url", ParamKind::Text, "Absolute http(s) URL")]
    }

    fn record_kind(&self) -> Option<MemoryKind> {
        Some(MemoryKind::DocumentReference)
    }

    async fn execute(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolError> {
        let (url, html) = self.pages.get(input.param_str("url")?).await?;

        let title = self
            .extractor
            .title(&html)
            .unwrap_or_else(|| "No title".to_string());
        let mut text = self.extractor.text(&html);
        if text.is_empty() {
            return Err(ToolError::Execution(format!("{} has no readable text", url)));
        }
        let total_chars = text.chars().count();
        if total_chars > MAX_PAGE_CHARS {
            text = text.chars().take(MAX_PAGE_CHARS).collect();
        }

        debug!(url = %url, chars = total_chars, "Fetched page");
        Ok(ToolOutput::json(
            json!({ "url": url.as_str(), "title": title, "chars": total_chars }),
            format!("{}\n\n{}", title, text),
        )
        .with_source(url.to_string()))
    }
}

/// `extract_links` tool
pub struct ExtractLinksTool {
    pages: Arc<PageFetcher>,
    extractor: Arc<HtmlExtractor>,
}

#[async_trait]
impl ResearchTool for ExtractLinksTool {
    fn name(&self) -> &str {
        "extract_links"
    }

    fn description(&self) -> &str {
        "Download a web page and list the links it contains with their text."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("url", ParamKind::Text, "Absolute http(s) URL"),
            ParamSpec::optional(
                "limit",
                ParamKind::Integer,
                "Maximum number of links (1-200, default 50)",
            ),
        ]
    }

    fn record_kind(&self) -> Option<MemoryKind> {
        Some(MemoryKind::DocumentReference)
    }

    async fn execute(&self, input: &ToolInput) -> std::result::Result<ToolOutput, ToolError> {
        let limit = input
            .param_i64_opt("limit")
            .map(|n| n.clamp(1, MAX_LINKS as i64) as usize)
            .unwrap_or(DEFAULT_LINKS);
        let (url, html) = self.pages.get(input.param_str("url")?).await?;

        let mut links = self.extractor.links(&html, &url);
        let total = links.len();
        links.truncate(limit);
        info!(url = %url, total, kept = links.len(), "Extracted links");

        let text = if links.is_empty() {
            format!("No links found on {}", url)
        } else {
            links
                .iter()
                .enumerate()
                .map(|(i, link)| format!("{}. {} ({})", i + 1, link.text, link.url))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(ToolOutput::json(
            json!({ "url": url.as_str(), "total": total, "links": links }),
            text,
        )
        .with_source(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DDG_HTML: &str = r#"
        <div class="result">
          <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fclimate.ec.europa.eu%2Fpolicy&amp;rut=abc">EU <b>Climate</b> Policy</a>
          <a class="result__snippet" href="x">Targets for <b>2024</b> and beyond.</a>
        </div>
        <div class="result">
          <a rel="nofollow" class="result__a" href="https://www.ipcc.ch/report/">IPCC Report</a>
          <a class="result__snippet" href="y">Assessment report.</a>
        </div>
    "#;

    fn config(server: &MockServer, providers: &[&str]) -> WebToolConfig {
        WebToolConfig {
            google_endpoint: format!("{}/customsearch/v1", server.uri()),
            duckduckgo_endpoint: format!("{}/html/", server.uri()),
            search_providers: providers.iter().map(|p| p.to_string()).collect(),
            google_api_key_env: "SCOUT_TEST_UNSET_GOOGLE_KEY".to_string(),
            google_engine_id_env: "SCOUT_TEST_UNSET_GOOGLE_CX".to_string(),
            ..WebToolConfig::default()
        }
    }

    fn credentials() -> GoogleCredentials {
        GoogleCredentials {
            api_key: "key".to_string(),
            engine_id: "cx".to_string(),
        }
    }

    #[test]
    fn test_html_extraction() {
        let extractor = HtmlExtractor::new().unwrap();
        let html = "<html><head><title> Carbon &amp; Climate </title>\
                    <style>p { color: red }</style><script>var x = 1;</script></head>\
                    <body><p>First paragraph.</p><div>Second&nbsp;block</div></body></html>";

        assert_eq!(extractor.title(html).as_deref(), Some("Carbon & Climate"));
        let text = extractor.text(html);
        assert_eq!(text, "First paragraph.\nSecond block");
    }

    #[test]
    fn test_duckduckgo_parsing() {
        let extractor = HtmlExtractor::new().unwrap();
        let hits = extractor.duckduckgo_hits(DDG_HTML, 5);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://climate.ec.europa.eu/policy");
        assert_eq!(hits[0].title, "EU Climate Policy");
        assert_eq!(hits[0].snippet, "Targets for 2024 and beyond.");
        assert_eq!(hits[1].url, "https://www.ipcc.ch/report/");
    }

    #[test]
    fn test_entities_are_decoded() {
        let extractor = HtmlExtractor::new().unwrap();
        let html = "<html><head><title>Caf&eacute; report</title></head>\
                    <body><p>If a &lt; b and c &gt; d then &#8217;ok&#8217; &mdash; 5 &euro;</p></body></html>";

        assert_eq!(extractor.title(html).as_deref(), Some("Caf\u{e9} report"));
        assert_eq!(
            extractor.text(html),
            "If a < b and c > d then \u{2019}ok\u{2019} \u{2014} 5 \u{20ac}"
        );
    }

    #[test]
    fn test_link_extraction() {
        let extractor = HtmlExtractor::new().unwrap();
        let base = Url::parse("https://example.org/reports/index.html").unwrap();
        let html = r##"<body>
            <a href="2024.html">Annual <b>2024</b></a>
            <a href="/about#team">About</a>
            <a href="/about">About again</a>
            <a href="https://other.example/x">Elsewhere</a>
            <a href="javascript:void(0)">Menu</a>
            <a href="mailto:desk@example.org">Mail</a>
            <a href="#top">Top</a>
            <a>No target</a>
        </body>"##;

        let links = extractor.links(html, &base);

        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/reports/2024.html",
                "https://example.org/about",
                "https://other.example/x",
            ]
        );
        assert_eq!(links[0].text, "Annual 2024");
    }

    #[tokio::test]
    async fn test_google_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("q", "climate policy 2024"))
            .and(query_param("cx", "cx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"title": "Policy", "link": "https://example.org/a", "snippet": "s"}]
            })))
            .mount(&server)
            .await;

        let search = build_web_tools(&config(&server, &["google", "duckduckgo"])).unwrap().search;
        let search = search.with_google_credentials(credentials());

        let output = search
            .execute(&ToolInput::new("web_search").with_param("query", "climate policy 2024"))
            .await
            .unwrap();
        assert_eq!(output.data["provider"], "google");
        assert_eq!(output.source.as_deref(), Some("https://example.org/a"));
        assert!(output.text.contains("Policy"));
    }

    #[tokio::test]
    async fn test_cascade_falls_through_to_duckduckgo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DDG_HTML))
            .mount(&server)
            .await;

        let search = build_web_tools(&config(&server, &["google", "duckduckgo"])).unwrap().search;
        let search = search.with_google_credentials(credentials());

        let output = search
            .execute(
                &ToolInput::new("web_search")
                    .with_param("query", "climate")
                    .with_param("limit", 1i64),
            )
            .await
            .unwrap();
        assert_eq!(output.data["provider"], "duckduckgo");
        assert_eq!(output.data["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_google_only_fails() {
        let server = MockServer::start().await;
        let search = build_web_tools(&config(&server, &["google"])).unwrap().search;

        let err = search
            .execute(&ToolInput::new("web_search").with_param("query", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(ref m) if m.contains("no search provider")));
    }

    #[tokio::test]
    async fn test_fetch_webpage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><title>Net Zero</title><body><p>Emissions fell.</p></body></html>",
            ))
            .mount(&server)
            .await;

        let fetch = build_web_tools(&config(&server, &["duckduckgo"])).unwrap().fetch;
        let url = format!("{}/article", server.uri());
        let output = fetch
            .execute(&ToolInput::new("fetch_webpage").with_param("url", url.as_str()))
            .await
            .unwrap();

        assert_eq!(output.text, "Net Zero\n\nEmissions fell.");
        assert_eq!(output.source.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_fetch_rejects_disallowed_domain_and_scheme() {
        let server = MockServer::start().await;
        let mut cfg = config(&server, &["duckduckgo"]);
        cfg.allowed_domains = vec!["europa.eu".to_string()];
        let fetch = build_web_tools(&cfg).unwrap().fetch;

        assert!(fetch.pages.domain_allowed("climate.ec.europa.eu"));
        assert!(!fetch.pages.domain_allowed("noteuropa.eu"));

        let err = fetch
            .execute(&ToolInput::new("fetch_webpage").with_param("url", "https://evil.example/x"))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::DomainNotAllowed("evil.example".to_string()));

        let err = fetch
            .execute(&ToolInput::new("fetch_webpage").with_param("url", "file:///etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_fetch_http_error_is_execution_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetch = build_web_tools(&config(&server, &["duckduckgo"])).unwrap().fetch;
        let err = fetch
            .execute(
                &ToolInput::new("fetch_webpage")
                    .with_param("url", format!("{}/missing", server.uri())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_extract_links_tool() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hub/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a href="a.html">A</a><a href="../b.html">B</a><a href="a.html">A</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let tools = build_web_tools(&config(&server, &["duckduckgo"])).unwrap();
        let url = format!("{}/hub/", server.uri());
        let output = tools
            .links
            .execute(&ToolInput::new("extract_links").with_param("url", url.as_str()))
            .await
            .unwrap();

        assert_eq!(output.data["total"], 2);
        assert_eq!(
            output.data["links"][0]["url"],
            format!("{}/hub/a.html", server.uri())
        );
        assert_eq!(output.data["links"][1]["url"], format!("{}/b.html", server.uri()));
        assert_eq!(output.source.as_deref(), Some(url.as_str()));
        assert_eq!(tools.links.record_kind(), Some(MemoryKind::DocumentReference));

        let limited = tools
            .links
            .execute(
                &ToolInput::new("extract_links")
                    .with_param("url", url.as_str())
                    .with_param("limit", 1i64),
            )
            .await
            .unwrap();
        assert_eq!(limited.data["links"].as_array().unwrap().len(), 1);
        assert_eq!(limited.data["total"], 2);
    }

    #[tokio::test]
    async fn test_extract_links_respects_allowed_domains() {
        let server = MockServer::start().await;
        let mut cfg = config(&server, &["duckduckgo"]);
        cfg.allowed_domains = vec!["europa.eu".to_string()];
        let tools = build_web_tools(&cfg).unwrap();

        let err = tools
            .links
            .execute(&ToolInput::new("extract_links").with_param("url", "https://evil.example/"))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::DomainNotAllowed("evil.example".to_string()));
    }
}
