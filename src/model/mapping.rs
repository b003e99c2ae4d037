use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

pub const DEGRADED_ENTRY: &str = "default";

/// Per-tenant translation of logical field and status names to the ids and
/// labels a particular Jira project uses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectMapping {
    pub name: String,
    pub project_key: String,
    statuses: BTreeMap<String, Vec<String>>,
    fields: BTreeMap<String, String>,
}

impl ProjectMapping {
    pub fn new(name: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project_key: project_key.into(),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn with_field(mut self, logical: &str, field_id: &str) -> Self {
        self.fields.insert(logical.to_string(), field_id.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_statuses(mut self, bucket: &str, labels: &[&str]) -> Self {
        self.statuses.insert(
            bucket.to_string(),
            labels.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    /// Backend field id for a logical name. Unmapped names and placeholder
    /// ids both yield `None`; callers render those as blank.
    pub fn resolve(&self, logical: &str) -> Option<&str> {
        self.fields
            .get(logical)
            .map(|id| id.trim())
            .filter(|id| !is_placeholder(id))
    }

    /// Union of the labels configured under `bucket`. An unknown bucket
    /// yields an empty set, which must be read as "match nothing".
    pub fn status_labels_for(&self, bucket: &str) -> BTreeSet<&str> {
        self.statuses
            .get(bucket)
            .into_iter()
            .flatten()
            .map(|label| label.trim())
            .filter(|label| !label.is_empty())
            .collect()
    }

    pub fn default_jql(&self) -> String {
        format!(
            "project = {} AND statusCategory != Done ORDER BY created DESC",
            quote_jql(&self.project_key)
        )
    }

    /// JQL restricted to the labels of one status bucket. An empty bucket is
    /// refused rather than silently producing a query that matches nothing.
    pub fn status_jql(&self, bucket: &str) -> Result<String, ConfigError> {
        let labels = self.status_labels_for(bucket);
        if labels.is_empty() {
            return Err(ConfigError::EmptyStatusBucket {
                project: self.name.clone(),
                bucket: bucket.to_string(),
            });
        }
        let list = labels
            .into_iter()
            .map(quote_jql)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "project = {} AND status in ({list}) ORDER BY created DESC",
            quote_jql(&self.project_key)
        ))
    }
}

fn is_placeholder(id: &str) -> bool {
    id.is_empty() || id.to_ascii_lowercase().contains("xxx")
}

fn quote_jql(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(alias = "projetos")]
    projects: BTreeMap<String, RawProject>,
    #[serde(default, alias = "padrao")]
    default: Option<String>,
}

#[derive(Deserialize)]
struct RawProject {
    #[serde(default)]
    project_key: String,
    #[serde(default)]
    statuses: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

/// The whole mapping document: every configured project plus which one is
/// used when the caller does not pick.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    projects: BTreeMap<String, ProjectMapping>,
    default: String,
}

impl FieldMap {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Like [`FieldMap::load`], but hands back an empty mapping alongside the
    /// error so the caller can keep going with blank briefings.
    pub fn load_or_degraded(path: &Path) -> (Self, Option<ConfigError>) {
        match Self::load(path) {
            Ok(map) => (map, None),
            Err(err) => (Self::degraded(), Some(err)),
        }
    }

    pub fn degraded() -> Self {
        Self::single(ProjectMapping::new(DEGRADED_ENTRY, ""))
    }

    pub fn single(project: ProjectMapping) -> Self {
        let default = project.name.clone();
        let mut projects = BTreeMap::new();
        projects.insert(default.clone(), project);
        Self { projects, default }
    }

    pub fn default_project(&self) -> &ProjectMapping {
        // `default` is checked against `projects` on construction.
        &self.projects[&self.default]
    }

    /// Looks an entry up by its name, then by its Jira project key.
    pub fn project(&self, name: &str) -> Result<&ProjectMapping, ConfigError> {
        self.projects
            .get(name)
            .or_else(|| {
                self.projects
                    .values()
                    .find(|p| p.project_key.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| ConfigError::UnknownProject(name.to_string()))
    }

    #[cfg(test)]
    pub fn project_names(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    fn from_structured(raw: RawDocument) -> Result<Self, ConfigError> {
        if raw.projects.is_empty() {
            return Err(ConfigError::Structure("no projects defined".into()));
        }
        let default = match raw.default {
            Some(name) => name,
            None if raw.projects.len() == 1 => raw.projects.keys().next().cloned().unwrap_or_default(),
            None => {
                return Err(ConfigError::Structure(
                    "several projects defined but no default chosen".into(),
                ))
            }
        };
        if !raw.projects.contains_key(&default) {
            return Err(ConfigError::MissingDefault(default));
        }
        let projects = raw
            .projects
            .into_iter()
            .map(|(name, p)| {
                let mapping = ProjectMapping {
                    name: name.clone(),
                    project_key: p.project_key,
                    statuses: p.statuses,
                    fields: p.fields,
                };
                (name, mapping)
            })
            .collect();
        Ok(Self { projects, default })
    }

    fn from_flat(map: serde_json::Map<String, Value>) -> Result<Self, ConfigError> {
        let mut project = ProjectMapping::new(DEGRADED_ENTRY, "");
        for (logical, id) in map {
            match id {
                Value::String(id) => {
                    project.fields.insert(logical, id);
                }
                Value::Null => {
                    project.fields.insert(logical, String::new());
                }
                other => {
                    return Err(ConfigError::Structure(format!(
                        "field {logical:?} maps to {other}, expected a field id string"
                    )))
                }
            }
        }
        Ok(Self::single(project))
    }
}

impl std::str::FromStr for FieldMap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(&strip_line_comments(s))?;
        let Value::Object(map) = value else {
            return Err(ConfigError::Structure("top level must be an object".into()));
        };
        if map.contains_key("projects") || map.contains_key("projetos") {
            let raw: RawDocument = serde_json::from_value(Value::Object(map))?;
            Self::from_structured(raw)
        } else {
            Self::from_flat(map)
        }
    }
}

/// Drops `//` comments that sit outside string literals.
fn strip_line_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}
