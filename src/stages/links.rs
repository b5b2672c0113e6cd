//! 链接提取与可达性探测
//!
//! 从答案文本中提取 Markdown 链接与裸 URL，去掉末尾标点并按首次出现顺序去重；
//! 可选地对每个 URL 发 HEAD 请求（跟随重定向、带超时）。

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;

/// 搜索接口自身的 URL，不算作引用来源
const SEARCH_API_PREFIX: &str = "https://api.bing.microsoft.com";

static MARKDOWN_LINK_RE: OnceLock<Regex> = OnceLock::new();
static PLAIN_URL_RE: OnceLock<Regex> = OnceLock::new();
static CITATION_MARK_RE: OnceLock<Regex> = OnceLock::new();
static EMPTY_PARENS_RE: OnceLock<Regex> = OnceLock::new();
static SPACE_RUN_RE: OnceLock<Regex> = OnceLock::new();

/// 1 = 链接文字，2 = URL
fn markdown_link_re() -> &'static Regex {
    MARKDOWN_LINK_RE.get_or_init(|| {
        Regex::new(r"\[([^\]]*)\]\((https?://[^)\s]+)\)").expect("valid regex")
    })
}

fn plain_url_re() -> &'static Regex {
    PLAIN_URL_RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]()]+"#).expect("valid regex")
    })
}

/// [1]、【3:0†source】 这类引用角标
fn citation_mark_re() -> &'static Regex {
    CITATION_MARK_RE
        .get_or_init(|| Regex::new(r"\[\d+(:\d+[^\]]*)?\]|【[^】]*】").expect("valid regex"))
}

fn empty_parens_re() -> &'static Regex {
    EMPTY_PARENS_RE.get_or_init(|| Regex::new(r"\(\s*\)").expect("valid regex"))
}

fn space_run_re() -> &'static Regex {
    SPACE_RUN_RE.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("valid regex"))
}

fn clean_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', '!', '?', ':'])
}

fn push_unique(urls: &mut Vec<String>, url: &str) {
    let url = clean_url(url);
    if url.len() > "https://".len() && !urls.iter().any(|u| u == url) {
        urls.push(url.to_string());
    }
}

/// 提取文本中的 URL（Markdown 链接优先，其后为裸 URL）
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for cap in markdown_link_re().captures_iter(text) {
        if let Some(m) = cap.get(2) {
            push_unique(&mut urls, m.as_str());
        }
    }
    for m in plain_url_re().find_iter(text) {
        push_unique(&mut urls, m.as_str());
    }
    urls
}

/// 去掉链接后的正文：Markdown 链接只留文字，裸 URL 与引用角标删除
pub fn strip_links(text: &str) -> String {
    let text = markdown_link_re().replace_all(text, "$1");
    let text = plain_url_re().replace_all(&text, "");
    let text = citation_mark_re().replace_all(&text, "");
    let text = empty_parens_re().replace_all(&text, "");
    let text = space_run_re().replace_all(&text, " ");
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// 合并注解引用与正文 URL，过滤搜索接口地址
pub fn collect_links(citations: &[String], text: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for url in citations.iter().map(String::as_str) {
        if !url.starts_with(SEARCH_API_PREFIX) {
            push_unique(&mut urls, url);
        }
    }
    for url in extract_urls(text) {
        if !url.starts_with(SEARCH_API_PREFIX) {
            push_unique(&mut urls, &url);
        }
    }
    urls
}

/// 是否为搜索接口自身的地址
pub fn is_search_api_url(url: &str) -> bool {
    url.starts_with(SEARCH_API_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    /// Ok(状态码) 表示 2xx；Err 为失败描述
    pub outcome: Result<u16, String>,
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn describe(&self) -> String {
        match &self.outcome {
            Ok(status) => format!("{} (HTTP {})", self.url, status),
            Err(e) => format!("{} ({})", self.url, e),
        }
    }
}

/// HEAD 探测器
pub struct LinkProbe {
    client: Client,
}

impl LinkProbe {
    pub fn new(timeout_secs: u64) -> Self {
        const USER_AGENT: &str = "QuestionnaireAgent-LinkChecker/1.0";
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// 依次探测每个 URL
    pub async fn probe(&self, urls: &[String]) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let outcome = match self.client.head(url).send().await {
                Ok(resp) if resp.status().is_success() => Ok(resp.status().as_u16()),
                Ok(resp) => Err(format!("HTTP {}", resp.status().as_u16())),
                Err(e) => Err(format!("Error: {}", e)),
            };
            match &outcome {
                Ok(_) => tracing::debug!("Link reachable: {}", url),
                Err(e) => tracing::info!("Link unreachable: {} ({})", url, e),
            }
            results.push(ProbeResult {
                url: url.clone(),
                outcome,
            });
        }
        results
    }
}
