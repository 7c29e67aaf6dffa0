//! Run configuration, read once at startup from the environment (and `.env`).
//!
//! | Variable            | Meaning                               | Default                            |
//! |---------------------|---------------------------------------|------------------------------------|
//! | `API_KEY`           | ofdata.ru API key                     | required for `run` and `fetch`     |
//! | `OFDATA_SEARCH_URL` | search endpoint                       | `https://api.ofdata.ru/v2/search`  |
//! | `DATABASE_PATH`     | SQLite database file                  | `data/companies.sqlite`            |
//! | `PAGE_LIMIT`        | records requested per page            | `100`                              |
//! | `HTTP_TIMEOUT_SECS` | per-request timeout                   | `30`                               |
//! | `OKVED_CODES`       | comma separated OKVED codes           | none                               |
//! | `REGION`            | region number                         | none                               |
//!
//! Command-line flags override any of these.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::DEFAULT_SEARCH_URL;
use crate::db::DEFAULT_DB_PATH;
use crate::error::{Error, Result};
use crate::fetcher::DEFAULT_PAGE_LIMIT;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub search_url: String,
    pub database_path: PathBuf,
    pub page_limit: u32,
    pub http_timeout: Duration,
    /// Raw codes; validated right before a fetch.
    pub okved_codes: Vec<String>,
    /// Raw region; validated right before a fetch.
    pub region: Option<String>,
}

// Keeps the API key out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("search_url", &self.search_url)
            .field("database_path", &self.database_path)
            .field("page_limit", &self.page_limit)
            .field("http_timeout", &self.http_timeout)
            .field("okved_codes", &self.okved_codes)
            .field("region", &self.region)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let page_limit = parse_or(var("PAGE_LIMIT"), "PAGE_LIMIT", DEFAULT_PAGE_LIMIT)?;
        if page_limit == 0 {
            return Err(Error::Config("PAGE_LIMIT must be positive".into()));
        }
        let timeout_secs = parse_or(
            var("HTTP_TIMEOUT_SECS"),
            "HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;

        Ok(Self {
            api_key: var("API_KEY"),
            search_url: var("OFDATA_SEARCH_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            database_path: var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            page_limit,
            http_timeout: Duration::from_secs(timeout_secs),
            okved_codes: var("OKVED_CODES")
                .map(|v| split_codes(&v))
                .unwrap_or_default(),
            region: var("REGION"),
        })
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::Config("API_KEY is not set".into()))
    }
}

/// Split a comma separated code list, dropping blanks.
pub fn split_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} is not a valid number: {v:?}"))),
        None => Ok(default),
    }
}
