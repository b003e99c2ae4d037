use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use futures::{stream, Stream, StreamExt, TryStreamExt};
use serde::Deserialize;

use super::desk::{self, Desk};
use super::http::ReqwestTransport;
use super::shapes::{SearchPage, SearchShape};
use super::{HttpRequest, HttpResponse, Transport};
use crate::error::JiraError;
use crate::model::issue::Issue;

/// Whether this account can use the standard search API. Probed once per
/// client and never re-probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Unprobed,
    CoreOk,
    CoreUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub jql: String,
    /// Needed only by the service desk fallback, which cannot run JQL.
    pub project_key: Option<String>,
    pub fields: Option<Vec<String>>,
}

impl SearchQuery {
    pub fn new(jql: impl Into<String>) -> Self {
        Self {
            jql: jql.into(),
            project_key: None,
            fields: None,
        }
    }

    pub fn with_project(mut self, project_key: impl Into<String>) -> Self {
        let key = project_key.into();
        self.project_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// What a search managed to fetch before (possibly) failing.
#[derive(Debug)]
pub struct PartialSearch {
    pub issues: Vec<Issue>,
    pub error: Option<JiraError>,
}

enum Cursor {
    Start,
    Core {
        start_at: usize,
        shape: Option<SearchShape>,
        /// Page size the server applied, once a page has shown it.
        limit: Option<usize>,
    },
    Desk {
        desk_id: String,
        start: usize,
    },
    Done,
}

#[derive(Deserialize)]
struct FieldInfo {
    id: String,
    #[serde(default)]
    name: String,
}

/// Jira client for a single (site, credentials) pair. The capability and
/// desk caches live for as long as the client does; methods touching them
/// take `&mut self`, so one client serves one caller at a time.
pub struct JiraClient<T = ReqwestTransport> {
    transport: T,
    base_url: String,
    page_size: usize,
    capability: Capability,
    desks: Option<Vec<Desk>>,
    desk_ids: HashMap<String, String>,
}

impl JiraClient<ReqwestTransport> {
    pub fn connect(
        base_url: &str,
        email: &str,
        api_token: &str,
        timeout: Duration,
        page_size: usize,
    ) -> Result<Self, JiraError> {
        let transport = ReqwestTransport::new(email, api_token, timeout)?;
        Ok(Self::new(transport, base_url, page_size))
    }
}

impl<T: Transport> JiraClient<T> {
    pub fn new(transport: T, base_url: &str, page_size: usize) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
            capability: Capability::Unprobed,
            desks: None,
            desk_ids: HashMap::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }

    /// Probes `/myself` the first time it is called. Any failure to get a 200,
    /// including network errors, counts as "unavailable" rather than an error.
    pub async fn can_use_core_api(&mut self) -> bool {
        if self.capability == Capability::Unprobed {
            self.capability = self.probe().await;
            tracing::debug!(capability = ?self.capability, "probed standard API");
        }
        self.capability == Capability::CoreOk
    }

    async fn probe(&self) -> Capability {
        let request = HttpRequest::get(format!("{}/rest/api/3/myself", self.base_url));
        match self.transport.execute(request).await {
            Ok(resp) if resp.is_ok() => Capability::CoreOk,
            Ok(resp) => {
                tracing::debug!(status = resp.status, "identity probe rejected");
                Capability::CoreUnavailable
            }
            Err(err) => {
                tracing::debug!("identity probe failed: {err}");
                Capability::CoreUnavailable
            }
        }
    }

    /// Service desk id for a project key, cached per key. The desk list
    /// itself is fetched at most once.
    pub async fn desk_id_for(&mut self, project_key: &str) -> Result<String, JiraError> {
        let cache_key = project_key.to_uppercase();
        if let Some(id) = self.desk_ids.get(&cache_key) {
            return Ok(id.clone());
        }
        if self.desks.is_none() {
            let request = desk::desks_request(&self.base_url);
            let url = request.url.clone();
            let resp = self.send_checked(request).await?;
            self.desks = Some(desk::parse_desks(&url, &resp.body)?);
        }
        let desks = self.desks.as_deref().unwrap_or_default();
        let id = desk::find_desk(desks, project_key)?.id.clone();
        tracing::debug!(project = project_key, desk = %id, "resolved service desk");
        self.desk_ids.insert(cache_key, id.clone());
        Ok(id)
    }

    /// Lazily fetch every issue matching `query`, one page at a time. The
    /// stream is single-pass; calling `search` again starts over at offset 0.
    pub fn search<'a>(
        &'a mut self,
        query: &'a SearchQuery,
    ) -> impl Stream<Item = Result<Issue, JiraError>> + 'a {
        stream::try_unfold((self, Cursor::Start), move |(client, cursor)| async move {
            let fetched = client.next_page(query, cursor).await?;
            Ok::<_, JiraError>(fetched.map(|(page, next)| (page, (client, next))))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<Issue, JiraError>)))
        .try_flatten()
    }

    /// Fetch everything. A failure on any page discards what was already
    /// fetched; see [`JiraClient::search_all_partial`] to keep it.
    pub async fn search_all(&mut self, query: &SearchQuery) -> Result<Vec<Issue>, JiraError> {
        let issues: Vec<Issue> = self.search(query).try_collect().await?;
        tracing::info!(count = issues.len(), "fetched issues");
        Ok(issues)
    }

    pub async fn search_all_partial(&mut self, query: &SearchQuery) -> PartialSearch {
        let results = self.search(query);
        futures::pin_mut!(results);

        let mut issues = Vec::new();
        while let Some(next) = results.next().await {
            match next {
                Ok(issue) => issues.push(issue),
                Err(error) => {
                    tracing::warn!(kept = issues.len(), "search stopped early: {error}");
                    return PartialSearch {
                        issues,
                        error: Some(error),
                    };
                }
            }
        }
        PartialSearch {
            issues,
            error: None,
        }
    }

    /// Field id → human name, from the standard API. Empty when that API is
    /// not available to this account.
    pub async fn field_names(&mut self) -> Result<BTreeMap<String, String>, JiraError> {
        if !self.can_use_core_api().await {
            return Ok(BTreeMap::new());
        }
        let request = HttpRequest::get(format!("{}/rest/api/3/field", self.base_url));
        let url = request.url.clone();
        let resp = self.send_checked(request).await?;
        let fields: Vec<FieldInfo> =
            serde_json::from_str(&resp.body).map_err(|err| JiraError::Decode {
                url,
                message: err.to_string(),
            })?;
        Ok(fields.into_iter().map(|f| (f.id, f.name)).collect())
    }

    async fn next_page(
        &mut self,
        query: &SearchQuery,
        cursor: Cursor,
    ) -> Result<Option<(Vec<Issue>, Cursor)>, JiraError> {
        let cursor = match cursor {
            Cursor::Start => self.route(query).await?,
            other => other,
        };

        match cursor {
            Cursor::Start | Cursor::Done => Ok(None),
            Cursor::Core {
                start_at,
                shape,
                limit,
            } => {
                let (shape, page) = self.fetch_core_page(query, start_at, shape).await?;
                let received = page.issues.len();
                if received == 0 {
                    return Ok(None);
                }
                let next_start = start_at + received;
                // Without `maxResults` the first page's length is the applied size,
                // so a capped first page never ends the search on its own.
                let applied = page.max_results.or(limit).unwrap_or(received);
                let finished =
                    page.total.is_some_and(|total| next_start >= total) || received < applied;
                let next = if finished {
                    Cursor::Done
                } else {
                    Cursor::Core {
                        start_at: next_start,
                        shape: Some(shape),
                        limit: Some(applied),
                    }
                };
                Ok(Some((page.issues, next)))
            }
            Cursor::Desk { desk_id, start } => {
                let request = desk::requests_request(&self.base_url, &desk_id, start, self.page_size);
                let url = request.url.clone();
                let resp = self.send_checked(request).await?;
                let page = desk::parse_requests(&url, &resp.body)?;
                let received = page.issues.len();
                if received == 0 {
                    return Ok(None);
                }
                let next = if page.is_last_page {
                    Cursor::Done
                } else {
                    Cursor::Desk {
                        desk_id,
                        start: start + received,
                    }
                };
                Ok(Some((page.issues, next)))
            }
        }
    }

    async fn route(&mut self, query: &SearchQuery) -> Result<Cursor, JiraError> {
        if self.can_use_core_api().await {
            return Ok(Cursor::Core {
                start_at: 0,
                shape: None,
                limit: None,
            });
        }
        let project = query
            .project_key
            .as_deref()
            .ok_or(JiraError::NoProjectForFallback)?;
        tracing::debug!(project, "standard API unavailable, listing service desk requests");
        let desk_id = self.desk_id_for(project).await?;
        Ok(Cursor::Desk { desk_id, start: 0 })
    }

    async fn fetch_core_page(
        &self,
        query: &SearchQuery,
        start_at: usize,
        locked: Option<SearchShape>,
    ) -> Result<(SearchShape, SearchPage), JiraError> {
        let fields = query.fields.as_deref();

        if let Some(shape) = locked {
            let request = shape.request(&self.base_url, &query.jql, fields, start_at, self.page_size);
            let url = request.url.clone();
            let resp = self.send_checked(request).await?;
            return Ok((shape, shape.parse(&url, &resp.body)?));
        }

        let mut last: Option<HttpResponse> = None;
        for shape in SearchShape::PREFERENCE {
            let request = shape.request(&self.base_url, &query.jql, fields, start_at, self.page_size);
            let url = request.url.clone();
            let resp = self.transport.execute(request).await?;
            if resp.is_unauthorized() {
                return Err(JiraError::Authentication { url });
            }
            if resp.is_ok() {
                tracing::debug!(shape = shape.name(), "search shape accepted");
                return Ok((shape, shape.parse(&url, &resp.body)?));
            }
            tracing::debug!(shape = shape.name(), status = resp.status, "search shape rejected");
            last = Some(resp);
        }

        let last = last.unwrap_or(HttpResponse {
            status: 0,
            body: String::new(),
        });
        Err(JiraError::ShapesExhausted {
            status: last.status,
            body: last.body,
        })
    }

    async fn send_checked(&self, request: HttpRequest) -> Result<HttpResponse, JiraError> {
        let url = request.url.clone();
        let resp = self.transport.execute(request).await?;
        if resp.is_unauthorized() {
            return Err(JiraError::Authentication { url });
        }
        if !resp.is_ok() {
            return Err(JiraError::UnexpectedStatus {
                url,
                status: resp.status,
                body: resp.body,
            });
        }
        Ok(resp)
    }
}
