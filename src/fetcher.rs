use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::api::{SearchApi, SearchQuery, SearchReply};
use crate::error::Result;
use crate::model::{CompanyRecord, ResultSet};
use crate::validate::{validate_inputs, OkvedCode, RegionCode, SearchInput};

pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Why paging stopped for one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStop {
    /// Page counter passed the server-reported page total.
    EndOfResults,
    /// 200 reply without records. Could be the end or a glitch; the registry doesn't say.
    EmptyPage,
    /// Non-200 reply.
    HttpStatus(u16),
}

impl PageStop {
    pub fn is_anomaly(self) -> bool {
        !matches!(self, PageStop::EndOfResults)
    }
}

/// Paging summary for one code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSummary {
    pub okved: OkvedCode,
    pub requests: u32,
    pub records: usize,
    pub stop: PageStop,
}

#[derive(Debug)]
pub struct FetchReport {
    pub results: ResultSet,
    pub summaries: Vec<CodeSummary>,
}

impl FetchReport {
    pub fn anomalies(&self) -> usize {
        self.summaries.iter().filter(|s| s.stop.is_anomaly()).count()
    }
}

/// Pages through the registry search one code at a time.
pub struct Fetcher<A: SearchApi> {
    api: A,
    page_limit: u32,
}

impl<A: SearchApi> Fetcher<A> {
    pub fn new(api: A, page_limit: u32) -> Self {
        Self {
            api,
            page_limit: page_limit.max(1),
        }
    }

    /// Validate raw inputs, then fetch. Nothing is requested if validation fails.
    pub async fn fetch_raw<S: AsRef<str>>(
        &self,
        codes: &[S],
        region: Option<&str>,
    ) -> Result<FetchReport> {
        let input = validate_inputs(codes, region)?;
        self.fetch_all(&input).await
    }

    /// Fetch every code in order. Any transport failure aborts the whole run.
    pub async fn fetch_all(&self, input: &SearchInput) -> Result<FetchReport> {
        info!(
            "Fetching {} OKVED codes in region {}",
            input.codes.len(),
            input.region
        );
        let pb = ProgressBar::new(input.codes.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} OKVED {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut results = ResultSet::new();
        let mut summaries = Vec::with_capacity(input.codes.len());

        for code in &input.codes {
            pb.set_message(code.to_string());
            let (records, summary) = match self.fetch_code(code, input.region).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    pb.abandon();
                    return Err(e);
                }
            };
            info!(
                "OKVED {}: {} companies in {} requests ({:?})",
                code, summary.records, summary.requests, summary.stop
            );
            results.insert(code.clone(), records);
            summaries.push(summary);
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(FetchReport { results, summaries })
    }

    /// Collect all pages for a single code, starting from page 1.
    pub async fn fetch_code(
        &self,
        code: &OkvedCode,
        region: RegionCode,
    ) -> Result<(Vec<CompanyRecord>, CodeSummary)> {
        let mut records = Vec::new();
        let mut query = SearchQuery {
            okved: code.clone(),
            region,
            limit: self.page_limit,
            page: 1,
        };
        let mut requests = 0;

        let stop = loop {
            let reply = self.api.search(&query).await?;
            requests += 1;

            let response = match reply {
                SearchReply::Ok(response) => response,
                SearchReply::Status(status) => {
                    warn!(
                        "OKVED {} page {}: HTTP {}, skipping the rest of this code",
                        code, query.page, status
                    );
                    break PageStop::HttpStatus(status);
                }
            };

            let note = response.note();
            let Some(data) = response.into_data() else {
                warn!(
                    "OKVED {} page {}: no data in reply{}",
                    code,
                    query.page,
                    note.map(|n| format!(" ({n})")).unwrap_or_default()
                );
                break PageStop::EmptyPage;
            };

            records.extend(data.records);
            query.page += 1;
            // A reply without a page total is treated as the last page.
            let total_pages = data.total_pages.unwrap_or(query.page - 1);
            if query.page > total_pages {
                break PageStop::EndOfResults;
            }
        };

        let summary = CodeSummary {
            okved: code.clone(),
            requests,
            records: records.len(),
            stop,
        };
        Ok((records, summary))
    }
}
