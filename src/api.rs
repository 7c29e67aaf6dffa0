use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::Result;
use crate::model::CompanyRecord;
use crate::validate::{OkvedCode, RegionCode};

pub const DEFAULT_SEARCH_URL: &str = "https://api.ofdata.ru/v2/search";

/// One page request against the registry search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub okved: OkvedCode,
    pub region: RegionCode,
    pub limit: u32,
    pub page: u32,
}

impl SearchQuery {
    /// Query-string pairs, minus the API key.
    fn params(&self) -> [(&'static str, String); 6] {
        [
            ("by", "okved".to_string()),
            ("obj", "org".to_string()),
            ("query", self.okved.to_string()),
            ("region", self.region.to_string()),
            ("limit", self.limit.to_string()),
            ("page", self.page.to_string()),
        ]
    }
}

/// Body of a 200 reply. `data` may be missing, `null`, `[]` or `{}` when nothing matched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "lenient_data")]
    data: Option<SearchData>,
    #[serde(default)]
    pub meta: Option<SearchMeta>,
}

/// Anything that isn't a usable data object counts as "no data", not as a broken reply.
fn lenient_data<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> core::result::Result<Option<SearchData>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchData {
    #[serde(rename = "Записи", default)]
    pub records: Vec<CompanyRecord>,
    #[serde(rename = "СтрВсего", default)]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SearchResponse {
    #[cfg(test)]
    pub fn with_data(records: Vec<CompanyRecord>, total_pages: u32) -> Self {
        SearchResponse {
            data: Some(SearchData {
                records,
                total_pages: Some(total_pages),
            }),
            meta: None,
        }
    }

    /// Server-side status and note attached to the reply, if any.
    pub fn note(&self) -> Option<String> {
        let meta = self.meta.as_ref()?;
        match (meta.status.as_deref(), meta.message.as_deref()) {
            (None, None) => None,
            (status, message) => Some(format!(
                "{}: {}",
                status.unwrap_or("-"),
                message.unwrap_or("-")
            )),
        }
    }

    /// The data section, if it carries at least one record.
    pub fn into_data(self) -> Option<SearchData> {
        match self.data {
            Some(data) if !data.records.is_empty() => Some(data),
            _ => None,
        }
    }
}

/// What one page request produced, short of a transport failure.
#[derive(Debug, Clone)]
pub enum SearchReply {
    Ok(SearchResponse),
    /// Any non-200 status.
    Status(u16),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Request a single page.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ConnectionFailure`] when the request could not be completed
    /// or the 200 body could not be decoded.
    async fn search(&self, query: &SearchQuery) -> Result<SearchReply>;
}

/// HTTP client for the ofdata.ru search endpoint.
pub struct OfdataClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OfdataClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SearchApi for OfdataClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchReply> {
        debug!(okved = %query.okved, page = query.page, "GET {}", self.base_url);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("key", self.api_key.as_str())])
            .query(&query.params())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(SearchReply::Status(status.as_u16()));
        }

        let body = response.json::<SearchResponse>().await?;
        Ok(SearchReply::Ok(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn query() -> SearchQuery {
        SearchQuery {
            okved: "62.01".parse().unwrap(),
            region: "27".parse().unwrap(),
            limit: 100,
            page: 3,
        }
    }

    #[test]
    fn query_params_match_endpoint_contract() {
        let params = query().params();
        let pairs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        assert_eq!(
            pairs,
            [
                ("by", "okved"),
                ("obj", "org"),
                ("query", "62.01"),
                ("region", "27"),
                ("limit", "100"),
                ("page", "3"),
            ]
        );
    }

    #[test]
    fn parses_full_page() {
        let body = r#"{
            "data": {
                "Записи": [
                    {"НаимПолн": "ООО Ромашка", "ИНН": "1234567890", "КПП": "123456789", "ЮрАдрес": "г. Пермь"},
                    {"НаимПолн": "АО Лютик", "ИНН": "0987654321"}
                ],
                "СтрВсего": 4,
                "ЗапВсего": 310
            },
            "meta": {"status": "ok", "balance": 100}
        }"#;
        let resp: SearchResponse = serde_json::from_str(body).unwrap();
        let data = resp.into_data().unwrap();
        assert_eq!(data.records.len(), 2);
        assert_eq!(data.total_pages, Some(4));
        assert_eq!(data.records[1].kpp, None);
    }

    #[test]
    fn empty_data_shapes_yield_nothing() {
        for body in [
            r#"{}"#,
            r#"{"data": null}"#,
            r#"{"data": []}"#,
            r#"{"data": {}}"#,
            r#"{"data": {"Записи": [], "СтрВсего": 0}}"#,
            r#"{"data": {"Записи": null}, "meta": {"status": "error", "message": "no results"}}"#,
        ] {
            let resp: SearchResponse = serde_json::from_str(body).unwrap();
            assert!(resp.into_data().is_none(), "body {body} should have no data");
        }
    }

    /// Accept one connection, answer with `reply` after `delay`, hand back the request line.
    async fn serve_once(reply: String, delay: Duration) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&chunk[..n]);
            }
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&head)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });
        (format!("http://{addr}/v2/search"), handle)
    }

    fn http_reply(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn page_two() -> SearchQuery {
        SearchQuery {
            page: 2,
            ..query()
        }
    }

    #[tokio::test]
    async fn sends_key_and_search_params() {
        let body = r#"{"data": {"Записи": [{"НаимПолн": "ООО Ромашка", "ИНН": "1234567890"}], "СтрВсего": 2}}"#;
        let (url, server) = serve_once(http_reply("200 OK", body), Duration::ZERO).await;
        let client = OfdataClient::new(&url, "k3y", Duration::from_secs(5)).unwrap();

        let reply = client.search(&page_two()).await.unwrap();
        let request_line = server.await.unwrap();
        assert_eq!(
            request_line,
            "GET /v2/search?key=k3y&by=okved&obj=org&query=62.01&region=27&limit=100&page=2 HTTP/1.1"
        );

        let response = match reply {
            SearchReply::Ok(response) => response,
            other => panic!("expected a 200 reply, got {other:?}"),
        };
        let data = response.into_data().unwrap();
        assert_eq!(data.records[0].full_name.as_deref(), Some("ООО Ромашка"));
        assert_eq!(data.total_pages, Some(2));
    }

    #[tokio::test]
    async fn non_200_becomes_status() {
        let (url, server) = serve_once(
            http_reply("500 Internal Server Error", r#"{"error": "boom"}"#),
            Duration::ZERO,
        )
        .await;
        let client = OfdataClient::new(&url, "k3y", Duration::from_secs(5)).unwrap();

        let reply = client.search(&page_two()).await.unwrap();
        assert!(matches!(reply, SearchReply::Status(500)), "got {reply:?}");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_is_connection_failure() {
        let (url, server) = serve_once(http_reply("200 OK", "hello"), Duration::ZERO).await;
        let client = OfdataClient::new(&url, "k3y", Duration::from_secs(5)).unwrap();

        let err = client.search(&page_two()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailure(_)), "got {err:?}");
        assert!(!err.to_string().contains("k3y"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn slow_reply_times_out_as_connection_failure() {
        let body = r#"{"data": {"Записи": [{"ИНН": "1234567890"}], "СтрВсего": 1}}"#;
        let (url, server) = serve_once(http_reply("200 OK", body), Duration::from_millis(1500)).await;
        let client = OfdataClient::new(&url, "k3y", Duration::from_millis(300)).unwrap();

        let err = client.search(&page_two()).await.unwrap_err();
        match &err {
            Error::ConnectionFailure(cause) => {
                let timed_out = cause
                    .downcast_ref::<reqwest::Error>()
                    .is_some_and(|e| e.is_timeout());
                assert!(timed_out, "expected a timeout, got {cause}");
            }
            other => panic!("expected ConnectionFailure, got {other:?}"),
        }
        assert!(!format!("{err:?}").contains("k3y"));
        server.abort();
    }

    #[tokio::test]
    async fn reqwest_errors_become_connection_failures() {
        let client = OfdataClient::new("not a url", "secret", Duration::from_secs(1)).unwrap();
        let err = client.search(&query()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionFailure(_)));
        assert!(!err.to_string().contains("secret"));
    }
}
