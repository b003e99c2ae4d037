use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub jira: Option<JiraConfig>,
    #[serde(default)]
    pub briefing: BriefingConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct JiraConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub api_token: String,
    pub base_url: Option<String>,
    pub cloud_id: Option<String>,
    #[serde(default)]
    pub use_ex_api: bool,
    pub site_subdomain: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BriefingConfig {
    pub field_map: Option<PathBuf>,
    pub project: Option<String>,
    pub jql: Option<String>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            field_map: None,
            project: None,
            jql: None,
            lookback_days: default_lookback_days(),
            lookahead_days: default_lookahead_days(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    100
}

fn default_lookback_days() -> i64 {
    7
}

fn default_lookahead_days() -> i64 {
    14
}

impl JiraConfig {
    /// Site root: an explicit `base_url`, else the cloud gateway when
    /// `use_ex_api` is set, else `https://{site_subdomain}.atlassian.net`.
    pub fn base_url(&self) -> Result<String> {
        if let Some(url) = self.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.trim().trim_end_matches('/').to_string());
        }
        if self.use_ex_api {
            match self.cloud_id.as_deref().filter(|c| !c.is_empty()) {
                Some(cloud_id) => return Ok(format!("https://api.atlassian.com/ex/jira/{cloud_id}")),
                None => bail!("jira.use_ex_api is set but jira.cloud_id is missing"),
            }
        }
        match self.site_subdomain.as_deref().filter(|s| !s.is_empty()) {
            Some(sub) => Ok(format!("https://{sub}.atlassian.net")),
            None => bail!("Set jira.base_url, jira.site_subdomain or jira.cloud_id in the config"),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check_credentials(&self) -> Result<()> {
        if self.email.trim().is_empty() || self.api_token.trim().is_empty() {
            bail!("Jira email and API token are required (config file or FSBRIEF_JIRA_EMAIL / FSBRIEF_JIRA_API_TOKEN)");
        }
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(email) = var("FSBRIEF_JIRA_EMAIL") {
            self.email = email;
        }
        if let Some(token) = var("FSBRIEF_JIRA_API_TOKEN") {
            self.api_token = token;
        }
        if let Some(url) = var("FSBRIEF_JIRA_BASE_URL") {
            self.base_url = Some(url);
        }
    }
}

impl AppConfig {
    /// The `[jira]` table with environment overrides applied.
    pub fn jira(&self) -> JiraConfig {
        self.jira_with_env(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn jira_with_env(&self, var: impl Fn(&str) -> Option<String>) -> JiraConfig {
        let mut jira = self.jira.clone().unwrap_or_else(|| JiraConfig {
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            ..Default::default()
        });
        jira.apply_env(var);
        jira
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fsbrief")
}

fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> AppConfig {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(config.jira.is_none());
        assert_eq!(config.briefing.lookback_days, 7);
        assert_eq!(config.briefing.lookahead_days, 14);
    }

    #[test]
    fn reads_file_with_defaults_filled_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[jira]\nemail = \"wt@example.com\"\napi_token = \"t\"\nsite_subdomain = \"acme\"\n\n[briefing]\nfield_map = \"/etc/fieldmap.json\"\nproject = \"FSA\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        let jira = config.jira.as_ref().unwrap();
        assert_eq!(jira.timeout_secs, 30);
        assert_eq!(jira.page_size, 100);
        assert_eq!(jira.base_url().unwrap(), "https://acme.atlassian.net");
        assert_eq!(config.briefing.project.as_deref(), Some("FSA"));
        assert_eq!(
            config.briefing.field_map.as_deref(),
            Some(Path::new("/etc/fieldmap.json"))
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[jira\nemail=").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn base_url_precedence() {
        let explicit = parse(
            "[jira]\nbase_url = \"https://jira.example.com/\"\ncloud_id = \"c\"\nuse_ex_api = true\n",
        );
        assert_eq!(
            explicit.jira.unwrap().base_url().unwrap(),
            "https://jira.example.com"
        );

        let gateway = parse("[jira]\ncloud_id = \"abc-123\"\nuse_ex_api = true\n");
        assert_eq!(
            gateway.jira.unwrap().base_url().unwrap(),
            "https://api.atlassian.com/ex/jira/abc-123"
        );

        let missing = parse("[jira]\nuse_ex_api = true\n");
        assert!(missing.jira.unwrap().base_url().is_err());
        assert!(JiraConfig::default().base_url().is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let config = parse("[jira]\nemail = \"file@example.com\"\napi_token = \"file\"\n");
        let jira = config.jira_with_env(|name| match name {
            "FSBRIEF_JIRA_API_TOKEN" => Some("env-token".into()),
            "FSBRIEF_JIRA_BASE_URL" => Some("https://env.atlassian.net".into()),
            _ => None,
        });
        assert_eq!(jira.email, "file@example.com");
        assert_eq!(jira.api_token, "env-token");
        assert_eq!(jira.base_url().unwrap(), "https://env.atlassian.net");
        assert!(jira.check_credentials().is_ok());
    }

    #[test]
    fn absent_jira_table_uses_defaults_and_requires_credentials() {
        let jira = AppConfig::default().jira_with_env(|_| None);
        assert_eq!(jira.page_size, 100);
        assert_eq!(jira.timeout(), Duration::from_secs(30));
        assert!(jira.check_credentials().is_err());
    }
}
