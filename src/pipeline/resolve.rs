//! Paper resolution: map an arXiv identifier to its PDF URL via the arXiv
//! export API (Atom feed).

use crate::config::BridgeConfig;
use crate::error::Arxiv2MdError;
use crate::pipeline::input::canonical_pdf_url;
use std::time::Duration;
use tracing::{debug, info};

/// One `<entry>` of an arXiv Atom feed, reduced to what resolution needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    /// Abstract-page URL, e.g. `http://arxiv.org/abs/2302.14691v1`.
    pub id: String,
    /// RFC 3339 timestamp of the last update.
    pub updated: String,
    /// The `<link title="pdf">` target, when present.
    pub pdf_link: Option<String>,
}

impl FeedEntry {
    /// PDF URL for this entry, derived from the abstract URL when the feed
    /// carries no explicit pdf link.
    pub fn pdf_url(&self) -> String {
        match &self.pdf_link {
            Some(link) => link.clone(),
            None => canonical_pdf_url(&self.id),
        }
    }

    fn is_api_error(&self) -> bool {
        self.id.contains("/api/errors")
    }
}

/// Client for the arXiv search API.
#[derive(Debug, Clone)]
pub struct ArxivClient {
    http: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl ArxivClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            timeout,
        }
    }

    pub fn from_config(http: reqwest::Client, config: &BridgeConfig) -> Self {
        Self::new(
            http,
            &config.arxiv_api_base,
            Duration::from_secs(config.download_timeout_secs),
        )
    }

    /// Look up `paper_id` and return the PDF URL of the most recently
    /// updated matching record, or `None` when nothing matches.
    pub async fn resolve_url(&self, paper_id: &str) -> Result<Option<String>, Arxiv2MdError> {
        let paper_id = paper_id.trim();
        if paper_id.is_empty() {
            return Err(Arxiv2MdError::InvalidInput {
                input: paper_id.to_string(),
            });
        }

        info!("Resolving arXiv id {paper_id}");
        let response = self
            .http
            .get(&self.api_base)
            .query(&[
                ("id_list", paper_id),
                ("max_results", "1"),
                ("sortBy", "lastUpdatedDate"),
                ("sortOrder", "descending"),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Arxiv2MdError::SearchFailed {
                reason: e.to_string(),
            })?;

        // The export API answers malformed ids with HTTP 400 and an error
        // entry; treat both as "no such paper".
        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            debug!("arXiv rejected id {paper_id} as malformed");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Arxiv2MdError::SearchFailed {
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Arxiv2MdError::SearchFailed {
                reason: e.to_string(),
            })?;

        let url = most_recent(parse_feed(&body)?).map(|e| e.pdf_url());
        match &url {
            Some(u) => info!("Resolved {paper_id} -> {u}"),
            None => info!("No arXiv record for {paper_id}"),
        }
        Ok(url)
    }
}

/// Pick the most recently updated real entry. RFC 3339 timestamps in the
/// same zone order lexicographically.
pub fn most_recent(entries: Vec<FeedEntry>) -> Option<FeedEntry> {
    entries
        .into_iter()
        .filter(|e| !e.is_api_error() && !e.id.is_empty())
        .max_by(|a, b| a.updated.cmp(&b.updated))
}

/// Parse an arXiv Atom feed into its entries.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, Arxiv2MdError> {
    use quick_xml::events::{BytesStart, Event};
    use quick_xml::Reader;

    #[derive(PartialEq)]
    enum Field {
        Other,
        Id,
        Updated,
    }

    fn read_link(e: &BytesStart<'_>, entry: &mut FeedEntry) {
        let mut href = None;
        let mut is_pdf = false;
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"href" => href = Some(String::from_utf8_lossy(&attr.value).to_string()),
                b"title" => is_pdf |= attr.value.as_ref() == b"pdf",
                b"type" => is_pdf |= attr.value.as_ref() == b"application/pdf",
                _ => {}
            }
        }
        if is_pdf && entry.pdf_link.is_none() {
            entry.pdf_link = href;
        }
    }

    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field = Field::Other;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    current = Some(FeedEntry::default());
                } else if let Some(entry) = current.as_mut() {
                    match name.as_ref() {
                        b"id" => field = Field::Id,
                        b"updated" => field = Field::Updated,
                        b"link" => read_link(e, entry),
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let (b"link", Some(entry)) = (e.local_name().as_ref(), current.as_mut()) {
                    read_link(e, entry);
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(entry) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default();
                    match field {
                        Field::Id => entry.id.push_str(text.trim()),
                        Field::Updated => entry.updated.push_str(text.trim()),
                        Field::Other => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                b"id" | b"updated" => field = Field::Other,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Arxiv2MdError::MalformedFeed {
                    detail: format!("XML parse error: {e}"),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed {} feed entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>http://arxiv.org/api/cHxbiOdZaP56ODnBPIenZhzg5f8</id>
  <title type="html">ArXiv Query: id_list=2302.14691</title>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2302.14691v2</id>
    <updated>2023-06-01T12:00:00Z</updated>
    <published>2023-02-28T15:00:00Z</published>
    <title>In-Context Instruction Learning
      with Large Language Models</title>
    <author><name>Seonghyeon Ye</name></author>
    <link href="http://arxiv.org/abs/2302.14691v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2302.14691v2" rel="related" type="application/pdf"/>
  </entry>
</feed>"#;

    const ERROR_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_nope</id>
    <title>Error</title>
    <summary>incorrect id format for nope</summary>
    <updated>2024-01-01T00:00:00-05:00</updated>
    <link href="http://arxiv.org/api/errors#incorrect_id_format_for_nope" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entry_fields() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.id, "http://arxiv.org/abs/2302.14691v2");
        assert_eq!(e.updated, "2023-06-01T12:00:00Z");
        assert_eq!(e.pdf_url(), "http://arxiv.org/pdf/2302.14691v2");
    }

    #[test]
    fn feed_level_metadata_is_not_an_entry() {
        let entries = parse_feed(FEED).unwrap();
        assert!(entries.iter().all(|e| !e.id.contains("/api/cHx")));
    }

    #[test]
    fn falls_back_to_abs_id_without_pdf_link() {
        let xml = r#"<feed><entry><id>http://arxiv.org/abs/1706.03762v7</id>
            <updated>2023-08-02T00:00:00Z</updated><title>Attention</title></entry></feed>"#;
        let e = most_recent(parse_feed(xml).unwrap()).unwrap();
        assert_eq!(e.pdf_url(), "http://arxiv.org/pdf/1706.03762v7");
    }

    #[test]
    fn empty_feed_resolves_to_none() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
        assert!(most_recent(parse_feed(xml).unwrap()).is_none());
    }

    #[test]
    fn api_error_entries_are_ignored() {
        let entries = parse_feed(ERROR_FEED).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(most_recent(entries).is_none());
    }

    #[test]
    fn most_recent_prefers_latest_update() {
        let older = FeedEntry {
            id: "http://arxiv.org/abs/1v1".into(),
            updated: "2020-01-01T00:00:00Z".into(),
            ..Default::default()
        };
        let newer = FeedEntry {
            id: "http://arxiv.org/abs/1v2".into(),
            updated: "2021-01-01T00:00:00Z".into(),
            ..Default::default()
        };
        let picked = most_recent(vec![older, newer]).unwrap();
        assert_eq!(picked.id, "http://arxiv.org/abs/1v2");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_feed("<feed><entry></feed>").unwrap_err();
        assert!(matches!(err, Arxiv2MdError::MalformedFeed { .. }), "got: {err}");
    }

    /// Answer one request with `status` and `body`, returning the base URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/atom+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/api/query")
    }

    fn client(base: String) -> ArxivClient {
        ArxivClient::new(reqwest::Client::new(), base, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn resolve_returns_pdf_link_from_feed() {
        let base = serve_once("200 OK", FEED).await;
        let url = client(base).resolve_url("2302.14691").await.unwrap();
        assert_eq!(url.as_deref(), Some("http://arxiv.org/pdf/2302.14691v2"));
    }

    #[tokio::test]
    async fn bad_request_resolves_to_none() {
        let base = serve_once("400 Bad Request", ERROR_FEED).await;
        let url = client(base).resolve_url("nope").await.unwrap();
        assert_eq!(url, None);
    }

    #[tokio::test]
    async fn server_errors_are_search_failures() {
        let base = serve_once("503 Service Unavailable", "").await;
        let err = client(base).resolve_url("2302.14691").await.unwrap_err();
        match err {
            Arxiv2MdError::SearchFailed { reason } => assert!(reason.contains("503"), "{reason}"),
            other => panic!("expected SearchFailed, got {other}"),
        }
    }
}
