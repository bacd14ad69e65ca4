//! Typed Notion endpoints built on [`Client::execute`]

use reqwest::Method;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::error::{ApiError, ApiResult};
use super::models::{
    DataSource, Page, QueryDataSourceRequest, QueryDataSourceResponse, UpdatePageRequest,
};
use super::transport::Client;

fn require(value: &str, what: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{what} cannot be empty")));
    }
    Ok(())
}

impl Client {
    /// List the data sources under a database container
    pub async fn list_data_sources(
        &self,
        cancel: &CancellationToken,
        database_id: &str,
    ) -> ApiResult<Vec<DataSource>> {
        require(database_id, "database ID")?;

        #[derive(Deserialize)]
        struct Listing {
            #[serde(default)]
            results: Vec<DataSource>,
        }

        let listing: Listing = self
            .execute::<(), _>(
                cancel,
                Method::GET,
                &format!("databases/{database_id}/data_sources"),
                None,
            )
            .await?;
        Ok(listing.results)
    }

    pub async fn get_data_source(
        &self,
        cancel: &CancellationToken,
        data_source_id: &str,
    ) -> ApiResult<DataSource> {
        require(data_source_id, "data source ID")?;
        self.execute::<(), _>(
            cancel,
            Method::GET,
            &format!("data_sources/{data_source_id}"),
            None,
        )
        .await
    }

    /// Run one page of a data source query
    pub async fn query_data_source(
        &self,
        cancel: &CancellationToken,
        data_source_id: &str,
        request: &QueryDataSourceRequest,
    ) -> ApiResult<QueryDataSourceResponse> {
        require(data_source_id, "data source ID")?;
        self.execute(
            cancel,
            Method::POST,
            &format!("data_sources/{data_source_id}/query"),
            Some(request),
        )
        .await
    }

    pub async fn retrieve_page(&self, cancel: &CancellationToken, page_id: &str) -> ApiResult<Page> {
        require(page_id, "page ID")?;
        self.execute::<(), _>(cancel, Method::GET, &format!("pages/{page_id}"), None)
            .await
    }

    pub async fn update_page(
        &self,
        cancel: &CancellationToken,
        page_id: &str,
        request: &UpdatePageRequest,
    ) -> ApiResult<Page> {
        require(page_id, "page ID")?;
        self.execute(
            cancel,
            Method::PATCH,
            &format!("pages/{page_id}"),
            Some(request),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{test_client, ScriptedHttp};
    use crate::client::ErrorKind;

    #[tokio::test]
    async fn test_list_data_sources() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::json(
            200,
            r#"{"results":[{"id":"ds1","name":"Tasks","database_id":"db1"}]}"#,
        )]);
        let (client, _) = test_client(http.clone());

        let sources = client
            .list_data_sources(&CancellationToken::new(), "db1")
            .await
            .unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Tasks");
        assert_eq!(
            http.requests()[0].url.as_str(),
            "http://notion.test/v1/databases/db1/data_sources"
        );
    }

    #[tokio::test]
    async fn test_query_data_source_posts_body() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::json(
            200,
            r#"{"results":[],"has_more":false,"next_cursor":null}"#,
        )]);
        let (client, _) = test_client(http.clone());
        let request = QueryDataSourceRequest {
            start_cursor: Some("abc".to_string()),
            page_size: Some(25),
            ..Default::default()
        };

        client
            .query_data_source(&CancellationToken::new(), "ds1", &request)
            .await
            .unwrap();

        let sent = &http.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.url.path(), "/v1/data_sources/ds1/query");
        assert_eq!(
            http.request_bodies()[0],
            serde_json::json!({"start_cursor": "abc", "page_size": 25})
        );
    }

    #[tokio::test]
    async fn test_update_page_uses_patch() {
        let http = ScriptedHttp::new(vec![ScriptedHttp::json(200, r#"{"id":"p1"}"#)]);
        let (client, _) = test_client(http.clone());
        let request = UpdatePageRequest {
            archived: Some(true),
            ..Default::default()
        };

        let page = client
            .update_page(&CancellationToken::new(), "p1", &request)
            .await
            .unwrap();

        assert_eq!(page.id, "p1");
        assert_eq!(http.requests()[0].method, Method::PATCH);
        assert_eq!(http.request_bodies()[0], serde_json::json!({"archived": true}));
    }

    #[tokio::test]
    async fn test_empty_ids_rejected_without_request() {
        let http = ScriptedHttp::new(vec![]);
        let (client, _) = test_client(http.clone());
        let cancel = CancellationToken::new();

        let err = client.retrieve_page(&cancel, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = client.get_data_source(&cancel, "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(http.requests().is_empty());
    }
}
