//! Article lookups by PubMed id against the tier's bibliographic host.

use std::thread;
use std::time::Duration;

use log::{debug, warn};
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CdrError;
use crate::xml;

const FETCH_PATH: &str = "/entrez/eutils/efetch.fcgi";
const DEFAULT_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Cap on response text carried into error messages.
const MAX_ERROR_BODY: usize = 200;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("invalid PMID '{0}'")]
    InvalidPmid(String),

    #[error("no article found for PMID {0}")]
    NotFound(String),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("bibliographic service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("bibliographic service unreachable: {0}")]
    Transport(String),

    #[error("malformed article record: {0}")]
    Malformed(String),
}

impl LookupError {
    fn is_retryable(&self) -> bool {
        match self {
            LookupError::Timeout(_) | LookupError::Transport(_) => true,
            LookupError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<LookupError> for CdrError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::NotFound(pmid) => CdrError::not_found("Article", pmid),
            LookupError::Timeout(after) => CdrError::Timeout(format!("bibliographic lookup after {:?}", after)),
            other => CdrError::InvalidInput(other.to_string()),
        }
    }
}

/// The fields of an article record the Citation tools use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub pmid: String,
    pub title: String,
    pub journal: Option<String>,
    pub year: Option<String>,
    /// MEDLINE status such as `MEDLINE` or `In-Process`.
    pub status: Option<String>,
    /// The record as received.
    pub xml: String,
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((i, _)) => format!("{}... (truncated)", &body[..i]),
        None => body.to_string(),
    }
}

/// Extracts an article from an efetch response.
pub fn parse_article(pmid: &str, body: &str) -> Result<ArticleRecord, LookupError> {
    let root = xml::parse(body).map_err(|e| LookupError::Malformed(e.to_string()))?;
    let article = root
        .descendants()
        .into_iter()
        .find(|e| e.name == "PubmedArticle")
        .ok_or_else(|| LookupError::NotFound(pmid.to_string()))?;
    let title = article
        .first_text_by_suffix(&["Article", "ArticleTitle"])
        .ok_or_else(|| LookupError::Malformed("missing ArticleTitle".to_string()))?;
    let status = article
        .find_path(&["MedlineCitation"])
        .and_then(|c| c.attr("Status"))
        .map(str::to_string);
    Ok(ArticleRecord {
        pmid: pmid.to_string(),
        title,
        journal: article.first_text_by_suffix(&["Journal", "Title"]),
        year: article.first_text_by_suffix(&["PubDate", "Year"]),
        status,
        xml: body.to_string(),
    })
}

pub struct BibliographicClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    retries: u32,
}

impl BibliographicClient {
    /// `host` may be a bare host name (https is assumed) or a full URL.
    pub fn new(host: &str, timeout: Duration, api_key: Option<SecretString>) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        let host = host.trim().trim_end_matches('/');
        let base_url = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        Ok(Self {
            client,
            base_url,
            api_key,
            timeout,
            retries: DEFAULT_RETRIES,
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Fetches one article. Transient failures are retried; the lookup is
    /// a read, so repeating it is harmless.
    pub fn fetch(&self, pmid: &str) -> Result<ArticleRecord, LookupError> {
        let pmid = pmid.trim();
        if pmid.is_empty() || !pmid.chars().all(|c| c.is_ascii_digit()) {
            return Err(LookupError::InvalidPmid(pmid.to_string()));
        }
        let mut attempt = 0;
        loop {
            match self.fetch_once(pmid) {
                Ok(body) => return parse_article(pmid, &body),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!("PMID {} lookup failed, retrying ({}/{}): {}", pmid, attempt, self.retries, e);
                    thread::sleep(RETRY_DELAY * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetch_once(&self, pmid: &str) -> Result<String, LookupError> {
        let url = format!("{}{}", self.base_url, FETCH_PATH);
        let api_key = self.api_key.as_ref().map(|s| s.expose_secret().to_string());
        let mut query = vec![("db", "pubmed"), ("retmode", "xml"), ("id", pmid)];
        if let Some(key) = &api_key {
            query.push(("api_key", key.as_str()));
        }
        debug!("Fetching PMID {} from {}", pmid, self.base_url);
        let response = self.client.get(&url).query(&query).send().map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout(self.timeout)
            } else {
                LookupError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LookupError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="In-Process" Owner="NLM">
      <PMID Version="1">12345</PMID>
      <Article>
        <Journal>
          <JournalIssue><PubDate><Year>2023</Year></PubDate></JournalIssue>
          <Title>Journal of Oncology</Title>
        </Journal>
        <ArticleTitle>A study of things.</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_article() {
        let article = parse_article("12345", RECORD).unwrap();
        assert_eq!(article.title, "A study of things.");
        assert_eq!(article.journal.as_deref(), Some("Journal of Oncology"));
        assert_eq!(article.year.as_deref(), Some("2023"));
        assert_eq!(article.status.as_deref(), Some("In-Process"));
    }

    #[test]
    fn test_empty_set_is_not_found() {
        let err = parse_article("1", "<PubmedArticleSet/>").unwrap_err();
        assert!(matches!(err, LookupError::NotFound(_)));
        assert_eq!(CdrError::from(err).kind(), "NotFound");
    }

    #[test]
    fn test_rejects_bad_pmid() {
        let client = BibliographicClient::new("localhost", Duration::from_secs(1), None).unwrap();
        assert!(matches!(client.fetch("12a"), Err(LookupError::InvalidPmid(_))));
    }

    #[test]
    fn test_unreachable_host() {
        let client = BibliographicClient::new("http://127.0.0.1:9", Duration::from_secs(2), None)
            .unwrap()
            .with_retries(0);
        let err = client.fetch("12345").unwrap_err();
        assert!(matches!(err, LookupError::Transport(_) | LookupError::Timeout(_)));
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(500);
        assert!(truncate(&long).ends_with("(truncated)"));
        assert_eq!(truncate("short"), "short");
    }
}
