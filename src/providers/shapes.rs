use serde::Deserialize;
use serde_json::{json, Value};

use super::HttpRequest;
use crate::error::JiraError;
use crate::model::issue::Issue;

/// One request/response contract of the Jira search endpoint. The endpoint
/// has changed shape across versions, so the client tries these in
/// [`SearchShape::PREFERENCE`] order on the first page and sticks with the
/// first one answering 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchShape {
    /// `{"queries": [{jql, startAt, maxResults, fields}]}`, answered with one
    /// envelope per query.
    BatchedQueries,
    /// `{jql, startAt, maxResults, fields}` posted as a document.
    FlatPost,
    /// The flat shape as query-string parameters on a GET.
    FlatGet,
    /// The flat document posted to the older v2 `search` resource. Only the
    /// path differs from [`SearchShape::FlatPost`].
    LegacyPost,
}

impl SearchShape {
    pub const PREFERENCE: [SearchShape; 4] = [
        SearchShape::BatchedQueries,
        SearchShape::FlatPost,
        SearchShape::FlatGet,
        SearchShape::LegacyPost,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SearchShape::BatchedQueries => "batched-queries",
            SearchShape::FlatPost => "flat-post",
            SearchShape::FlatGet => "flat-get",
            SearchShape::LegacyPost => "legacy-post",
        }
    }

    pub fn request(
        &self,
        base_url: &str,
        jql: &str,
        fields: Option<&[String]>,
        start_at: usize,
        max_results: usize,
    ) -> HttpRequest {
        match self {
            SearchShape::BatchedQueries => {
                let mut query = json!({
                    "jql": jql,
                    "startAt": start_at,
                    "maxResults": max_results,
                });
                if let Some(fields) = fields {
                    query["fields"] = json!(fields);
                }
                HttpRequest::post(
                    format!("{base_url}/rest/api/3/search/jql"),
                    json!({ "queries": [query] }),
                )
            }
            SearchShape::FlatPost => HttpRequest::post(
                format!("{base_url}/rest/api/3/search/jql"),
                flat_body(jql, fields, start_at, max_results),
            ),
            SearchShape::FlatGet => {
                let mut url = format!(
                    "{base_url}/rest/api/3/search/jql?jql={}&startAt={start_at}&maxResults={max_results}",
                    urlencoding::encode(jql)
                );
                if let Some(fields) = fields {
                    url.push_str("&fields=");
                    url.push_str(&urlencoding::encode(&fields.join(",")));
                }
                HttpRequest::get(url)
            }
            SearchShape::LegacyPost => HttpRequest::post(
                format!("{base_url}/rest/api/2/search"),
                flat_body(jql, fields, start_at, max_results),
            ),
        }
    }

    /// Parse a 200 body. Shapes without a declared total report `None` and the
    /// pager treats an empty batch as the end.
    pub fn parse(&self, url: &str, body: &str) -> Result<SearchPage, JiraError> {
        let decode = |err: serde_json::Error| JiraError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        };
        match self {
            SearchShape::BatchedQueries => {
                let envelope: BatchedBody = serde_json::from_str(body).map_err(decode)?;
                Ok(envelope
                    .queries
                    .into_iter()
                    .next()
                    .map(SearchPage::from)
                    .unwrap_or_default())
            }
            SearchShape::FlatPost | SearchShape::FlatGet | SearchShape::LegacyPost => {
                let page: PageBody = serde_json::from_str(body).map_err(decode)?;
                Ok(page.into())
            }
        }
    }
}

fn flat_body(jql: &str, fields: Option<&[String]>, start_at: usize, max_results: usize) -> Value {
    let mut body = json!({
        "jql": jql,
        "startAt": start_at,
        "maxResults": max_results,
    });
    if let Some(fields) = fields {
        body["fields"] = json!(fields);
    }
    body
}

#[derive(Debug, Default, PartialEq)]
pub struct SearchPage {
    pub issues: Vec<Issue>,
    pub total: Option<usize>,
    /// Page size the server actually applied, which may be below the one
    /// requested.
    pub max_results: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    #[serde(default)]
    issues: Vec<Issue>,
    total: Option<usize>,
    max_results: Option<usize>,
}

impl From<PageBody> for SearchPage {
    fn from(page: PageBody) -> Self {
        Self {
            issues: page.issues,
            total: page.total,
            max_results: page.max_results,
        }
    }
}

#[derive(Deserialize)]
struct BatchedBody {
    #[serde(default)]
    queries: Vec<PageBody>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    const BASE: &str = "https://acme.atlassian.net";

    #[test]
    fn batched_request_nests_query() {
        let fields = vec!["summary".to_string(), "customfield_1".to_string()];
        let req = SearchShape::BatchedQueries.request(BASE, "project = FS", Some(&fields), 100, 50);
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, format!("{BASE}/rest/api/3/search/jql"));
        let body = req.body.unwrap();
        assert_eq!(body["queries"][0]["jql"], "project = FS");
        assert_eq!(body["queries"][0]["startAt"], 100);
        assert_eq!(body["queries"][0]["maxResults"], 50);
        assert_eq!(body["queries"][0]["fields"], json!(["summary", "customfield_1"]));
    }

    #[test]
    fn flat_get_encodes_parameters() {
        let fields = vec!["summary".to_string(), "created".to_string()];
        let req = SearchShape::FlatGet.request(BASE, "project = FS", Some(&fields), 0, 100);
        assert_eq!(req.method, Method::GET);
        assert!(req.body.is_none());
        assert_eq!(
            req.url,
            format!(
                "{BASE}/rest/api/3/search/jql?jql=project%20%3D%20FS&startAt=0&maxResults=100&fields=summary%2Ccreated"
            )
        );
    }

    #[test]
    fn fields_are_omitted_when_not_requested() {
        let req = SearchShape::LegacyPost.request(BASE, "x", None, 0, 10);
        assert_eq!(req.url, format!("{BASE}/rest/api/2/search"));
        assert!(req.body.unwrap().get("fields").is_none());
    }

    #[test]
    fn legacy_shape_reuses_flat_body_on_v2_path() {
        let fields = vec!["summary".to_string()];
        let flat = SearchShape::FlatPost.request(BASE, "x", Some(&fields), 20, 10);
        let legacy = SearchShape::LegacyPost.request(BASE, "x", Some(&fields), 20, 10);
        assert_eq!(legacy.url, format!("{BASE}/rest/api/2/search"));
        assert_ne!(legacy.url, flat.url);
        assert_eq!(legacy.body, flat.body);
    }

    #[test]
    fn parses_batched_envelope() {
        let body = r#"{"queries": [{"issues": [{"key": "FS-1", "fields": {}}], "total": 7, "maxResults": 1}]}"#;
        let page = SearchShape::BatchedQueries.parse(BASE, body).unwrap();
        assert_eq!(page.issues.len(), 1);
        assert_eq!(page.total, Some(7));
        assert_eq!(page.max_results, Some(1));
    }

    #[test]
    fn flat_page_without_total() {
        let body = r#"{"issues": [{"key": "FS-1"}, {"key": "FS-2"}], "nextPageToken": "t"}"#;
        let page = SearchShape::FlatPost.parse(BASE, body).unwrap();
        assert_eq!(page.issues.len(), 2);
        assert_eq!(page.total, None);
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        let err = SearchShape::FlatGet.parse(BASE, "<html>").unwrap_err();
        assert!(matches!(err, JiraError::Decode { .. }));
    }
}
