//! Windowed change queries
//!
//! Fetches every page edited inside a time window of a data source, newest
//! first. The descending order is part of the contract: consumers may treat
//! the first occurrence of a page as its latest state.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{
    ApiError, ApiResult, Client, ErrorKind, Page, QueryDataSourceRequest, QueryDataSourceResponse,
};

/// Results requested per page
pub const CHANGES_PAGE_SIZE: u32 = 100;

/// One polling sweep over `last_edited_time`
///
/// `[since, until]` when `lower_inclusive`, else `(since, until]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub lower_inclusive: bool,
}

impl ChangeWindow {
    /// Build a window, collapsing it to the instant `since` when `until` is
    /// not strictly after it
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>, lower_inclusive: bool) -> Self {
        let until = if until > since { until } else { since };
        Self {
            since,
            until,
            lower_inclusive,
        }
    }

    /// Notion filter selecting pages edited inside this window
    pub fn filter(&self) -> Value {
        let lower_key = if self.lower_inclusive {
            "on_or_after"
        } else {
            "after"
        };
        json!({
            "timestamp": "last_edited_time",
            "last_edited_time": {
                lower_key: format_timestamp(self.since),
                "on_or_before": format_timestamp(self.until),
            }
        })
    }

    /// Most recently edited first
    pub fn sorts() -> Vec<Value> {
        vec![json!({
            "timestamp": "last_edited_time",
            "direction": "descending",
        })]
    }
}

impl fmt::Display for ChangeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.lower_inclusive { '[' } else { '(' };
        write!(
            f,
            "{}{}, {}]",
            open,
            format_timestamp(self.since),
            format_timestamp(self.until)
        )
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Anything that can run one page of a data source query
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn query_page(
        &self,
        cancel: &CancellationToken,
        data_source_id: &str,
        request: &QueryDataSourceRequest,
    ) -> ApiResult<QueryDataSourceResponse>;
}

#[async_trait]
impl ChangeSource for Client {
    async fn query_page(
        &self,
        cancel: &CancellationToken,
        data_source_id: &str,
        request: &QueryDataSourceRequest,
    ) -> ApiResult<QueryDataSourceResponse> {
        self.query_data_source(cancel, data_source_id, request).await
    }
}

/// A change query that did not drain
#[derive(Error, Debug)]
#[error("query changes for {data_source_id} in {window}: {source}")]
pub struct ChangeQueryError {
    pub data_source_id: String,
    pub window: ChangeWindow,
    /// Pages fetched before a cancellation; empty for other failures
    pub partial: Vec<Page>,
    #[source]
    pub source: ApiError,
}

impl ChangeQueryError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }
}

/// Fetch every page edited inside the window, in remote order
pub async fn query_window<S>(
    source: &S,
    cancel: &CancellationToken,
    data_source_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    lower_inclusive: bool,
) -> Result<Vec<Page>, ChangeQueryError>
where
    S: ChangeSource + ?Sized,
{
    let window = ChangeWindow::new(since, until, lower_inclusive);
    let fail = |partial: Vec<Page>, source: ApiError| ChangeQueryError {
        data_source_id: data_source_id.to_string(),
        window,
        partial,
        source,
    };

    if data_source_id.trim().is_empty() {
        return Err(fail(
            Vec::new(),
            ApiError::Validation("data source ID cannot be empty".to_string()),
        ));
    }

    let filter = window.filter();
    let sorts = ChangeWindow::sorts();
    let mut cursor: Option<String> = None;
    let mut pages: Vec<Page> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(fail(pages, ApiError::Cancelled { during: "pagination" }));
        }

        let request = QueryDataSourceRequest {
            filter: Some(filter.clone()),
            sorts: sorts.clone(),
            start_cursor: cursor.take(),
            page_size: Some(CHANGES_PAGE_SIZE),
            ..Default::default()
        };

        let response = match source.query_page(cancel, data_source_id, &request).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() => return Err(fail(pages, e)),
            Err(e) => return Err(fail(Vec::new(), e)),
        };

        debug!(
            "Window {} page returned {} result(s), has_more={}",
            window,
            response.results.len(),
            response.has_more
        );

        let next = response.continuation().map(str::to_string);
        pages.extend(response.results);

        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(pages)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays query responses and records each request
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        responses: Mutex<VecDeque<ApiResult<QueryDataSourceResponse>>>,
        requests: Mutex<Vec<QueryDataSourceRequest>>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl ScriptedSource {
        pub(crate) fn new(responses: Vec<ApiResult<QueryDataSourceResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        pub(crate) fn requests(&self) -> Vec<QueryDataSourceRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChangeSource for ScriptedSource {
        async fn query_page(
            &self,
            _cancel: &CancellationToken,
            _data_source_id: &str,
            request: &QueryDataSourceRequest,
        ) -> ApiResult<QueryDataSourceResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(cancel) = &self.cancel_after_first {
                cancel.cancel();
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(QueryDataSourceResponse::default()))
        }
    }

    pub(crate) fn page(id: &str) -> Page {
        serde_json::from_value(json!({"id": id, "object": "page"})).unwrap()
    }

    pub(crate) fn results(ids: &[&str], next: Option<&str>) -> ApiResult<QueryDataSourceResponse> {
        Ok(QueryDataSourceResponse {
            results: ids.iter().map(|id| page(id)).collect(),
            has_more: next.is_some(),
            next_cursor: next.map(str::to_string),
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_inclusive_lower_bound_filter() {
        let source = ScriptedSource::new(vec![results(&["a"], None)]);
        let since = t0();
        let until = since + Duration::minutes(10);

        let pages = query_window(&source, &CancellationToken::new(), "ds", since, until, true)
            .await
            .unwrap();

        assert_eq!(pages.len(), 1);
        let req = &source.requests()[0];
        assert_eq!(
            req.filter.as_ref().unwrap(),
            &json!({
                "timestamp": "last_edited_time",
                "last_edited_time": {
                    "on_or_after": "2025-03-01T12:00:00Z",
                    "on_or_before": "2025-03-01T12:10:00Z",
                }
            })
        );
        assert_eq!(
            req.sorts,
            vec![json!({"timestamp": "last_edited_time", "direction": "descending"})]
        );
        assert_eq!(req.page_size, Some(CHANGES_PAGE_SIZE));
        assert!(req.start_cursor.is_none());
    }

    #[tokio::test]
    async fn test_exclusive_lower_bound_filter() {
        let source = ScriptedSource::new(vec![results(&[], None)]);
        let since = t0();

        query_window(
            &source,
            &CancellationToken::new(),
            "ds",
            since,
            since + Duration::minutes(2),
            false,
        )
        .await
        .unwrap();

        let filter = source.requests()[0].filter.clone().unwrap();
        let bounds = &filter["last_edited_time"];
        assert_eq!(bounds["after"], "2025-03-01T12:00:00Z");
        assert!(bounds.get("on_or_after").is_none());
    }

    #[tokio::test]
    async fn test_inverted_window_collapses_to_instant() {
        for until in [t0(), t0() - Duration::minutes(5)] {
            let source = ScriptedSource::new(vec![results(&[], None)]);

            let pages = query_window(&source, &CancellationToken::new(), "ds", t0(), until, true)
                .await
                .unwrap();

            assert!(pages.is_empty());
            let requests = source.requests();
            assert_eq!(requests.len(), 1);
            let bounds = &requests[0].filter.as_ref().unwrap()["last_edited_time"];
            assert_eq!(bounds["on_or_before"], bounds["on_or_after"]);
        }
    }

    #[tokio::test]
    async fn test_drains_pages_in_order() {
        let source = ScriptedSource::new(vec![
            results(&["c", "b"], Some("cur-1")),
            results(&["a"], Some("cur-2")),
            results(&["z"], None),
        ]);

        let pages = query_window(
            &source,
            &CancellationToken::new(),
            "ds",
            t0(),
            t0() + Duration::hours(1),
            true,
        )
        .await
        .unwrap();

        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a", "z"]);

        let cursors: Vec<_> = source
            .requests()
            .into_iter()
            .map(|r| r.start_cursor)
            .collect();
        assert_eq!(
            cursors,
            vec![None, Some("cur-1".to_string()), Some("cur-2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stops_on_empty_cursor() {
        let source = ScriptedSource::new(vec![
            Ok(QueryDataSourceResponse {
                results: vec![page("a")],
                has_more: true,
                next_cursor: Some(String::new()),
            }),
            results(&["never"], None),
        ]);

        let pages = query_window(&source, &CancellationToken::new(), "ds", t0(), t0(), true)
            .await
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_drain_returns_partial() {
        let cancel = CancellationToken::new();
        let source = ScriptedSource {
            cancel_after_first: Some(cancel.clone()),
            ..ScriptedSource::new(vec![
                results(&["a", "b"], Some("cur-1")),
                results(&["c"], None),
            ])
        };

        let err = query_window(&source, &cancel, "ds", t0(), t0(), true)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.partial.len(), 2);
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_kind_and_adds_context() {
        let source = ScriptedSource::new(vec![Err(ApiError::Remote {
            status: 404,
            code: "object_not_found".to_string(),
            message: "missing".to_string(),
        })]);

        let err = query_window(&source, &CancellationToken::new(), "ds-9", t0(), t0(), true)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        let msg = err.to_string();
        assert!(msg.contains("ds-9"));
        assert!(msg.contains("2025-03-01T12:00:00Z"));
        assert!(msg.contains("missing"));
    }

    #[tokio::test]
    async fn test_empty_data_source_rejected() {
        let source = ScriptedSource::new(vec![]);

        let err = query_window(&source, &CancellationToken::new(), "", t0(), t0(), true)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(source.requests().is_empty());
    }

    #[test]
    fn test_window_display() {
        let w = ChangeWindow::new(t0(), t0() + Duration::minutes(2), false);
        assert_eq!(w.to_string(), "(2025-03-01T12:00:00Z, 2025-03-01T12:02:00Z]");

        let w = ChangeWindow::new(t0(), t0() - Duration::minutes(2), true);
        assert_eq!(w.until, w.since);
        assert!(w.to_string().starts_with('['));
    }

    #[tokio::test]
    async fn test_client_change_source_drains_over_transport() {
        use crate::client::testing::{test_client, ScriptedHttp};

        let http = ScriptedHttp::new(vec![
            ScriptedHttp::json(
                200,
                r#"{"results":[{"id":"p2"}],"has_more":true,"next_cursor":"n1"}"#,
            ),
            ScriptedHttp::json(200, r#"{"results":[{"id":"p1"}],"has_more":false}"#),
        ]);
        let (client, _) = test_client(http.clone());

        let pages = query_window(&client, &CancellationToken::new(), "ds", t0(), t0(), true)
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        let bodies = http.request_bodies();
        assert_eq!(bodies[1]["start_cursor"], "n1");
        assert_eq!(bodies[0]["page_size"], 100);
    }
}
