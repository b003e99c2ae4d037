use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};

use crate::briefing;
use crate::config::{self, AppConfig};
use crate::model::mapping::{FieldMap, ProjectMapping};
use crate::providers::jira::{JiraClient, SearchQuery};
use crate::report;
use crate::schedule::{self, DateWindow};

#[derive(Debug, Parser)]
#[command(
    name = "fsbrief",
    version,
    about = "Technician briefings for field-service Jira tickets, grouped by scheduled date"
)]
pub struct Cli {
    /// Config file (default: ~/.fsbrief/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Field map document, overriding briefing.field_map
    #[arg(long, global = true)]
    pub field_map: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print one briefing per ticket, grouped by scheduled date
    Briefings(BriefingsArgs),
    /// List every field of one ticket, to help write a field map entry
    Fields {
        /// Issue key (FS-8877) or a JQL query
        target: String,
        /// Project key, needed when the standard API is unavailable
        #[arg(long)]
        project: Option<String>,
    },
    /// Show which Jira API this account can use
    Probe {
        /// Also resolve the service desk for this project key
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct BriefingsArgs {
    /// Field map entry (name or project key); defaults to the document default
    #[arg(long)]
    pub project: Option<String>,
    /// Raw JQL instead of the project default
    #[arg(long, conflicts_with = "status")]
    pub jql: Option<String>,
    /// Only tickets in this status bucket of the field map
    #[arg(long)]
    pub status: Option<String>,
    /// First day of the window (YYYY-MM-DD), inclusive
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Last day of the window (YYYY-MM-DD), inclusive
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Print whatever was fetched before a failing page instead of nothing
    #[arg(long)]
    pub keep_partial: bool,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Briefings(args) => handle_briefings(&config, cli.field_map.as_deref(), args).await,
        Command::Fields { target, project } => handle_fields(&config, &target, project).await,
        Command::Probe { project } => handle_probe(&config, project).await,
    }
}

fn connect(config: &AppConfig) -> Result<JiraClient> {
    let jira = config.jira();
    jira.check_credentials()?;
    let base_url = jira.base_url()?;
    tracing::debug!(%base_url, page_size = jira.page_size, "connecting to Jira");
    JiraClient::connect(
        &base_url,
        &jira.email,
        &jira.api_token,
        jira.timeout(),
        jira.page_size,
    )
    .context("Failed to set up the Jira client")
}

fn load_field_map(config: &AppConfig, cli_path: Option<&Path>) -> Result<FieldMap> {
    let Some(path) = cli_path.or(config.briefing.field_map.as_deref()) else {
        bail!("No field map configured. Pass --field-map or set briefing.field_map in the config");
    };
    let (map, err) = FieldMap::load_or_degraded(path);
    if let Some(err) = err {
        tracing::warn!("using an empty field map ({err}); briefings will be rendered with blank fields");
    }
    Ok(map)
}

fn select_project<'a>(map: &'a FieldMap, name: Option<&str>) -> Result<&'a ProjectMapping> {
    match name {
        Some(name) => Ok(map.project(name)?),
        None => Ok(map.default_project()),
    }
}

fn default_window(config: &AppConfig, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<DateWindow> {
    let today = Local::now().date_naive();
    let lookback = config.briefing.lookback_days;
    let lookahead = config.briefing.lookahead_days;
    let start = match from {
        Some(day) => day,
        None => lookback
            .checked_neg()
            .and_then(|days| shift_days(today, days))
            .with_context(|| format!("briefing.lookback_days = {lookback} is out of range"))?,
    };
    let end = match to {
        Some(day) => day,
        None => shift_days(today, lookahead)
            .with_context(|| format!("briefing.lookahead_days = {lookahead} is out of range"))?,
    };
    if start > end {
        bail!("--from {start} is after --to {end}");
    }
    Ok(DateWindow::new(start, end))
}

fn shift_days(day: NaiveDate, days: i64) -> Option<NaiveDate> {
    day.checked_add_signed(Duration::try_days(days)?)
}

fn briefing_jql(config: &AppConfig, mapping: &ProjectMapping, args: &BriefingsArgs) -> Result<String> {
    if let Some(jql) = &args.jql {
        return Ok(jql.clone());
    }
    if let Some(bucket) = &args.status {
        return Ok(mapping.status_jql(bucket)?);
    }
    Ok(config
        .briefing
        .jql
        .clone()
        .unwrap_or_else(|| mapping.default_jql()))
}

async fn handle_briefings(config: &AppConfig, field_map: Option<&Path>, args: BriefingsArgs) -> Result<()> {
    let map = load_field_map(config, field_map)?;
    let mapping = select_project(&map, args.project.as_deref().or(config.briefing.project.as_deref()))?;
    let window = default_window(config, args.from, args.to)?;
    let jql = briefing_jql(config, mapping, &args)?;
    let query = SearchQuery::new(jql)
        .with_project(mapping.project_key.clone())
        .with_fields(briefing::requested_fields(mapping));
    tracing::info!(project = %mapping.name, jql = %query.jql, "searching");

    let mut client = connect(config)?;
    let issues = if args.keep_partial {
        let partial = client.search_all_partial(&query).await;
        if let Some(err) = partial.error {
            eprintln!(
                "warning: Jira search stopped early ({err}); showing {} tickets fetched before the failure",
                partial.issues.len()
            );
        }
        partial.issues
    } else {
        client.search_all(&query).await.context("Jira search failed")?
    };

    let groups = schedule::arrange(issues, mapping, &window);
    if groups.is_empty() {
        println!("No tickets between {} and {}.", window.start, window.end);
        return Ok(());
    }
    for group in &groups {
        println!("==== {} ({} tickets) ====\n", group.date, group.issues.len());
        for issue in &group.issues {
            println!("{}", briefing::render(issue, mapping));
            println!("{}\n", client.browse_url(&issue.key));
        }
    }
    Ok(())
}

/// `FS-8877` style keys, as opposed to free JQL.
fn looks_like_issue_key(target: &str) -> bool {
    match target.split_once('-') {
        Some((project, number)) => {
            !project.is_empty()
                && project.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

async fn handle_fields(config: &AppConfig, target: &str, project: Option<String>) -> Result<()> {
    let is_key = looks_like_issue_key(target);
    let (jql, project) = if is_key {
        let prefix = target.split_once('-').map(|(p, _)| p.to_string());
        (format!("key = {target}"), project.or(prefix))
    } else {
        (target.to_string(), project)
    };
    let mut query = SearchQuery::new(jql);
    if let Some(project) = project {
        query = query.with_project(project);
    }

    let mut client = connect(config)?;
    let issues = client.search_all(&query).await.context("Jira search failed")?;
    let issue = if is_key {
        issues.into_iter().find(|i| i.key.eq_ignore_ascii_case(target))
    } else {
        issues.into_iter().next()
    };
    let Some(issue) = issue else {
        bail!("No ticket matched {target}");
    };

    let names = client
        .field_names()
        .await
        .context("Failed to fetch field names")?;
    println!("{}", issue.key);
    print!("{}", report::render_table(&report::field_dump(&issue, &names)));
    Ok(())
}

async fn handle_probe(config: &AppConfig, project: Option<String>) -> Result<()> {
    let mut client = connect(config)?;
    let available = client.can_use_core_api().await;
    tracing::debug!(capability = ?client.capability(), "probe finished");
    if available {
        println!("{}: standard search API available", client.base_url());
        return Ok(());
    }
    println!(
        "{}: standard search API unavailable, service desk fallback will be used",
        client.base_url()
    );
    if let Some(project) = project {
        let desk_id = client
            .desk_id_for(&project)
            .await
            .with_context(|| format!("Failed to resolve the service desk for {project}"))?;
        println!("{project}: service desk {desk_id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strs: &[&str]) -> Cli {
        Cli::try_parse_from(strs.iter().copied()).unwrap()
    }

    #[test]
    fn parses_briefings_with_window() {
        let cli = args(&[
            "fsbrief", "--field-map", "fm.json", "briefings", "--project", "FSA", "--from",
            "2024-02-01", "--to", "2024-04-01",
        ]);
        assert_eq!(cli.field_map.as_deref(), Some(Path::new("fm.json")));
        let Command::Briefings(b) = cli.command else {
            panic!("expected briefings");
        };
        assert_eq!(b.project.as_deref(), Some("FSA"));
        assert_eq!(b.from, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(b.to, NaiveDate::from_ymd_opt(2024, 4, 1));
    }

    #[test]
    fn rejects_bad_date() {
        assert!(Cli::try_parse_from(["fsbrief", "briefings", "--from", "01/02/2024"]).is_err());
    }

    #[test]
    fn jql_and_status_conflict() {
        assert!(Cli::try_parse_from(["fsbrief", "briefings", "--jql", "x", "--status", "AGENDADO"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = args(&["fsbrief", "probe", "-v", "--project", "FS"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Probe { project: Some(ref p) } if p == "FS"));
    }

    #[test]
    fn issue_key_detection() {
        assert!(looks_like_issue_key("FS-8877"));
        assert!(looks_like_issue_key("AB_2-1"));
        assert!(!looks_like_issue_key("project = FS"));
        assert!(!looks_like_issue_key("FS-"));
        assert!(!looks_like_issue_key("-12"));
    }

    #[test]
    fn jql_precedence() {
        let mapping = ProjectMapping::new("FSA", "FSA").with_statuses("AGENDADO", &["Agendado"]);
        let mut config = AppConfig::default();
        let base = BriefingsArgs {
            project: None,
            jql: None,
            status: None,
            from: None,
            to: None,
            keep_partial: false,
        };
        assert_eq!(briefing_jql(&config, &mapping, &base).unwrap(), mapping.default_jql());

        config.briefing.jql = Some("configured".into());
        assert_eq!(briefing_jql(&config, &mapping, &base).unwrap(), "configured");

        let status = BriefingsArgs {
            status: Some("AGENDADO".into()),
            ..base
        };
        assert!(briefing_jql(&config, &mapping, &status).unwrap().contains("\"Agendado\""));

        let unknown = BriefingsArgs {
            status: Some("NOPE".into()),
            ..status
        };
        assert!(briefing_jql(&config, &mapping, &unknown).is_err());
    }

    #[test]
    fn window_defaults_and_order() {
        let config = AppConfig::default();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1);
        let window = default_window(&config, day, day).unwrap();
        assert_eq!(window.start, window.end);
        assert!(default_window(&config, NaiveDate::from_ymd_opt(2024, 3, 2), day).is_err());

        let open = default_window(&config, None, None).unwrap();
        assert_eq!((open.end - open.start).num_days(), 21);
    }

    #[test]
    fn out_of_range_window_is_an_error() {
        let mut config = AppConfig::default();
        config.briefing.lookback_days = i64::MAX;
        assert!(default_window(&config, None, None).is_err());

        config.briefing.lookback_days = 7;
        config.briefing.lookahead_days = 1_000_000_000;
        let err = default_window(&config, None, None).unwrap_err();
        assert!(err.to_string().contains("lookahead_days"));

        // Explicit bounds never touch the configured offsets.
        let day = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert!(default_window(&config, day, day).is_ok());
    }

    #[test]
    fn broken_field_map_degrades_to_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldmap.json");
        std::fs::write(&path, "{ not json").unwrap();

        let map = load_field_map(&AppConfig::default(), Some(path.as_path())).unwrap();

        let mapping = map.default_project();
        assert_eq!(mapping.project_key, "");
        assert_eq!(mapping.resolve("store"), None);
    }
}
