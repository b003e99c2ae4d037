use std::collections::BTreeMap;

use crate::model::issue::Issue;
use crate::util::display::{normalize, truncate};

const VALUE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// Every field present on `issue`, sorted by id, with its friendly name (the
/// id itself when unknown) and a truncated display value. Used to build a
/// mapping entry for a project being onboarded.
pub fn field_dump(issue: &Issue, names: &BTreeMap<String, String>) -> Vec<FieldRow> {
    issue
        .fields
        .iter()
        .map(|(id, value)| FieldRow {
            id: id.clone(),
            name: names
                .get(id)
                .filter(|n| !n.is_empty())
                .cloned()
                .unwrap_or_else(|| id.clone()),
            value: truncate(&normalize(value).replace('\n', " "), VALUE_WIDTH),
        })
        .collect()
}

pub fn render_table(rows: &[FieldRow]) -> String {
    let id_width = rows.iter().map(|r| r.id.chars().count()).max().unwrap_or(0).max(8);
    let name_width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0).max(4);

    let mut out = format!("{:<id_width$} | {:<name_width$} | value\n", "field id", "name");
    out.push_str(&format!("{}-+-{}-+-{}\n", "-".repeat(id_width), "-".repeat(name_width), "-".repeat(5)));
    for row in rows {
        out.push_str(&format!(
            "{:<id_width$} | {:<name_width$} | {}\n",
            row.id, row.name, row.value
        ));
    }
    out
}
