//! Service desk requests, used when the account cannot reach the standard
//! search API.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::HttpRequest;
use crate::error::JiraError;
use crate::model::issue::{FieldValue, Issue};
use crate::util::display::normalize_json;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Desk {
    pub id: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
}

#[derive(Deserialize)]
struct DeskList {
    #[serde(default)]
    values: Vec<Desk>,
}

pub fn desks_request(base_url: &str) -> HttpRequest {
    HttpRequest::get(format!("{base_url}/rest/servicedeskapi/servicedesk"))
}

pub fn parse_desks(url: &str, body: &str) -> Result<Vec<Desk>, JiraError> {
    let list: DeskList = serde_json::from_str(body).map_err(|err| JiraError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    Ok(list.values)
}

/// Exact project key match first (ignoring case), then the key appearing in
/// a desk's display name.
pub fn find_desk<'a>(desks: &'a [Desk], project_key: &str) -> Result<&'a Desk, JiraError> {
    let needle = project_key.to_lowercase();
    desks
        .iter()
        .find(|d| d.project_key.eq_ignore_ascii_case(project_key))
        .or_else(|| {
            desks
                .iter()
                .find(|d| !needle.is_empty() && d.project_name.to_lowercase().contains(&needle))
        })
        .ok_or_else(|| JiraError::DeskNotFound {
            project: project_key.to_string(),
            seen: desks.iter().map(|d| d.project_key.clone()).collect(),
        })
}

pub fn requests_request(base_url: &str, desk_id: &str, start: usize, limit: usize) -> HttpRequest {
    HttpRequest::get(format!(
        "{base_url}/rest/servicedeskapi/request?serviceDeskId={}&requestStatus=ALL_REQUESTS&expand=requestFieldValues&start={start}&limit={limit}",
        urlencoding::encode(desk_id)
    ))
}

#[derive(Debug, Default, PartialEq)]
pub struct RequestPage {
    pub issues: Vec<Issue>,
    pub is_last_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestList {
    #[serde(default)]
    values: Vec<CustomerRequest>,
    #[serde(default)]
    is_last_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerRequest {
    issue_key: String,
    #[serde(default)]
    request_field_values: Vec<RequestFieldValue>,
    created_date: Option<DateDto>,
    summary: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFieldValue {
    field_id: Option<String>,
    label: Option<String>,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct DateDto {
    iso8601: Option<String>,
}

pub fn parse_requests(url: &str, body: &str) -> Result<RequestPage, JiraError> {
    let list: RequestList = serde_json::from_str(body).map_err(|err| JiraError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    Ok(RequestPage {
        issues: list.values.into_iter().map(into_issue).collect(),
        is_last_page: list.is_last_page,
    })
}

fn into_issue(request: CustomerRequest) -> Issue {
    let mut fields = BTreeMap::new();
    for entry in request.request_field_values {
        let Some(id) = entry.field_id.or(entry.label) else {
            continue;
        };
        let value = if entry.value.is_null() {
            FieldValue::Null
        } else {
            FieldValue::Text(normalize_json(&entry.value))
        };
        fields.insert(id, value);
    }

    let summary = request.summary.or_else(|| match fields.get("summary") {
        Some(FieldValue::Text(s)) => Some(s.clone()),
        _ => None,
    });
    fields.insert(
        "summary".to_string(),
        FieldValue::Text(summary.unwrap_or_default()),
    );
    let created = request.created_date.and_then(|d| d.iso8601);
    fields.insert(
        "created".to_string(),
        created.map(FieldValue::Text).unwrap_or(FieldValue::Null),
    );

    Issue {
        key: request.issue_key,
        fields,
    }
}
