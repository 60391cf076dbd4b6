//! Paginated search index backend.
//!
//! Runs one sorted search and then follows the scroll cursor until the
//! number of received hits reaches the total reported by the server. Hits
//! must arrive in strictly increasing timestamp order, within a page and
//! across pages; a regression means the cursor is no longer consistent and
//! the whole query fails.

use super::backend::TimeSeriesBackend;
use crate::core::{Datapoint, PredictError, QueryWindow, Result, SearchConfig, TimeSeries};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: IndicesClause,
    sort: [HashMap<&'static str, SortOrder>; 1],
    filter: TypeFilter<'a>,
}

#[derive(Debug, Serialize)]
struct IndicesClause {
    indices: IndicesBody,
}

#[derive(Debug, Serialize)]
struct IndicesBody {
    indices: Vec<String>,
    query: InnerQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum InnerQuery {
    MatchAll(MatchAll),
    Range { timestamp: RangeBounds },
}

#[derive(Debug, Serialize)]
struct MatchAll {}

#[derive(Debug, Serialize)]
struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    gte: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lte: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SortOrder {
    order: &'static str,
}

#[derive(Debug, Serialize)]
struct TypeFilter<'a> {
    #[serde(rename = "type")]
    doc_type: TypeValue<'a>,
}

#[derive(Debug, Serialize)]
struct TypeValue<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct ScrollRequest<'a> {
    scroll: &'a str,
    scroll_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ClearScrollRequest<'a> {
    scroll_id: [&'a str; 1],
}

/// One page of search results.
#[derive(Debug, Deserialize)]
pub struct SearchPage {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    total: HitsTotal,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// Older servers report a bare count, newer ones an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HitsTotal {
    Count(u64),
    Object { value: u64 },
}

impl HitsTotal {
    fn value(&self) -> u64 {
        match self {
            HitsTotal::Count(n) | HitsTotal::Object { value: n } => *n,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    timestamp: i64,
    #[serde(rename = "Values", default)]
    values: HashMap<String, i64>,
}

impl SearchPage {
    /// Total hits reported by the server.
    pub fn total(&self) -> u64 {
        self.hits.total.value()
    }
}

/// Reassembles per-operation series from consecutive pages.
#[derive(Debug)]
pub struct ScrollAccumulator {
    series: HashMap<String, Vec<Datapoint>>,
    last_timestamp: Option<i64>,
    received: u64,
}

impl ScrollAccumulator {
    /// Start accumulating for the given operations.
    pub fn new(operations: &[String]) -> Self {
        Self {
            series: operations
                .iter()
                .map(|op| (op.clone(), Vec::new()))
                .collect(),
            last_timestamp: None,
            received: 0,
        }
    }

    /// Number of hits absorbed so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Append a page, enforcing strictly increasing timestamps.
    pub fn absorb(&mut self, page: &SearchPage) -> Result<usize> {
        for hit in &page.hits.hits {
            let timestamp = hit.source.timestamp;
            if let Some(last) = self.last_timestamp {
                if timestamp <= last {
                    return Err(PredictError::protocol(format!(
                        "out of order results: timestamp {} after {}",
                        timestamp, last
                    )));
                }
            }
            for (op, points) in &mut self.series {
                if let Some(&value) = hit.source.values.get(op) {
                    points.push(Datapoint::new(timestamp, value));
                }
            }
            self.last_timestamp = Some(timestamp);
        }
        self.received += page.hits.hits.len() as u64;
        Ok(page.hits.hits.len())
    }

    /// Finish, applying the window's length limit.
    pub fn finish(self, window: &QueryWindow) -> HashMap<String, TimeSeries> {
        self.series
            .into_iter()
            .map(|(op, points)| (op, window.truncate(TimeSeries::from(points))))
            .collect()
    }
}

/// Month-bucketed index names covering `history_days` back from `now`.
///
/// `watchtower*` with 45 days of history on 2015-03-10 yields
/// `watchtower_2015-01`, `watchtower_2015-02` and `watchtower_2015-03`.
/// Fails when the look-back falls outside the representable date range.
pub fn monthly_indices(
    index: &str,
    history_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let prefix = index.trim_end_matches('*');
    let then = chrono::Duration::try_days(history_days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| {
            PredictError::config(format!("search history of {} days is out of range", history_days))
        })?
        .min(now);
    let (mut year, mut month) = (then.year(), then.month());

    let mut indices = Vec::new();
    loop {
        indices.push(format!("{}_{}-{:02}", prefix, year, month));
        if year == now.year() && month == now.month() {
            break;
        }
        if month < 12 {
            month += 1;
        } else {
            month = 1;
            year += 1;
        }
    }
    Ok(indices)
}

/// Backend backed by a scrolling search index.
#[derive(Debug, Clone)]
pub struct SearchBackend {
    base_url: String,
    index: String,
    doc_type: String,
    history_days: i64,
    page_size: usize,
    keep_alive: String,
    client: reqwest::Client,
}

impl SearchBackend {
    /// Create a search backend rooted at `base_url`.
    pub fn new<S: Into<String>>(
        base_url: S,
        config: &SearchConfig,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PredictError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: config.index.clone(),
            doc_type: config.doc_type.clone(),
            history_days: config.history_days,
            page_size: config.page_size,
            keep_alive: format!("{}s", config.scroll_keep_alive.as_secs().max(1)),
            client,
        })
    }

    fn indices(&self) -> Result<Vec<String>> {
        if self.history_days > 0 {
            monthly_indices(&self.index, self.history_days, Utc::now())
        } else {
            Ok(vec![self.index.clone()])
        }
    }

    fn build_request(&self, window: &QueryWindow) -> Result<SearchRequest<'_>> {
        let query = if window.has_range() {
            InnerQuery::Range {
                timestamp: RangeBounds {
                    gte: window.start,
                    lte: window.end,
                },
            }
        } else {
            InnerQuery::MatchAll(MatchAll {})
        };

        Ok(SearchRequest {
            query: IndicesClause {
                indices: IndicesBody {
                    indices: self.indices()?,
                    query,
                },
            },
            sort: [HashMap::from([("timestamp", SortOrder { order: "asc" })])],
            filter: TypeFilter {
                doc_type: TypeValue {
                    value: &self.doc_type,
                },
            },
        })
    }

    async fn fetch_page<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<SearchPage> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(PredictError::network(format!(
                "search returned {}: {}",
                status,
                text.trim()
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Absorb `first` and every continuation page, tracking the latest cursor.
    async fn drain(
        &self,
        first: &SearchPage,
        acc: &mut ScrollAccumulator,
        scroll_id: &mut Option<String>,
    ) -> Result<()> {
        let total = first.total();
        acc.absorb(first)?;

        let scroll_url = format!("{}/_search/scroll?scroll={}", self.base_url, self.keep_alive);
        while acc.received() < total {
            let id = scroll_id.as_deref().ok_or_else(|| {
                PredictError::protocol(format!(
                    "no scroll handle after {} of {} hits",
                    acc.received(),
                    total
                ))
            })?;
            let body = ScrollRequest {
                scroll: &self.keep_alive,
                scroll_id: id,
            };
            let page = self.fetch_page(&scroll_url, &body).await?;
            if page.scroll_id.is_some() {
                scroll_id.clone_from(&page.scroll_id);
            }
            if acc.absorb(&page)? == 0 {
                return Err(PredictError::protocol(format!(
                    "scroll ended after {} of {} hits",
                    acc.received(),
                    total
                )));
            }
        }
        Ok(())
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let url = format!("{}/_search/scroll", self.base_url);
        let body = ClearScrollRequest {
            scroll_id: [scroll_id],
        };
        match self.client.delete(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!("Failed to clear scroll cursor: {}", resp.status()),
            Err(e) => tracing::warn!("Failed to clear scroll cursor: {}", e),
        }
    }
}

#[async_trait::async_trait]
impl TimeSeriesBackend for SearchBackend {
    async fn query(
        &self,
        window: &QueryWindow,
        operations: &[String],
    ) -> Result<HashMap<String, TimeSeries>> {
        let request = self.build_request(window)?;
        tracing::debug!("Search query: {}", serde_json::to_string(&request)?);

        let url = format!(
            "{}/_search?scroll={}&size={}",
            self.base_url, self.keep_alive, self.page_size
        );
        let page = self.fetch_page(&url, &request).await?;
        let mut scroll_id = page.scroll_id.clone();
        let mut acc = ScrollAccumulator::new(operations);

        let drained = self.drain(&page, &mut acc, &mut scroll_id).await;
        // Released whether or not the scroll completed
        if let Some(id) = scroll_id.as_deref() {
            self.clear_scroll(id).await;
        }
        drained?;

        tracing::debug!("Search returned {} hits", acc.received());
        Ok(acc.finish(window))
    }

    fn name(&self) -> &'static str {
        "search"
    }
}
