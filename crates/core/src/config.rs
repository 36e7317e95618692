use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    pub drone: DroneConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Listen on this Unix socket instead of `port`.
    pub socket: Option<PathBuf>,
    pub templates: String,
    /// Deadline for a single snapshot pass, in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, socket: None, templates: "templates".to_string(), timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitHubConfig {
    pub token: Option<String>,
    /// Override for GitHub Enterprise installations.
    pub api_url: Option<Url>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DroneConfig {
    /// May be left out of the file and supplied as `DRONE_SERVER`.
    #[serde(default)]
    pub server: Option<Url>,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Total timeout applied to every request made by the shared client.
    #[serde(default = "default_drone_timeout")]
    pub timeout_secs: u64,
}

fn default_max_pages() -> u32 { 10 }

fn default_drone_timeout() -> u64 { 20 }

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DashboardConfig {
    pub org: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub exclude_repos: Vec<String>,
    pub branches: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<ExclusionRule>,
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
}

fn default_max_concurrent_lookups() -> usize { 32 }

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExclusionRule {
    pub repo: String,
    pub branch: String,
}

impl Config {
    /// Reads the YAML config at `path`, applies environment overrides and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        let mut config: Config = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Credentials may come from the environment instead of the config file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(server) = var("DRONE_SERVER").filter(|v| !v.is_empty()) {
            self.drone.server = Some(Url::parse(&server).context("Invalid DRONE_SERVER")?);
        }
        if let Some(token) = var("DRONE_TOKEN").filter(|v| !v.is_empty()) {
            self.drone.token = token;
        }
        if let Some(token) = var("GITHUB_TOKEN").filter(|v| !v.is_empty()) {
            self.github.token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let dashboard = &self.dashboard;
        ensure!(!dashboard.org.is_empty(), "dashboard.org must be set");
        ensure!(!dashboard.topics.is_empty(), "dashboard.topics must not be empty");
        ensure!(!dashboard.branches.is_empty(), "dashboard.branches must not be empty");
        ensure!(dashboard.max_concurrent_lookups > 0, "dashboard.max_concurrent_lookups must be > 0");
        ensure!(!self.drone.token.is_empty(), "drone.token must be set (or DRONE_TOKEN)");
        ensure!(self.drone.max_pages > 0, "drone.max_pages must be > 0");
        let Some(server) = &self.drone.server else {
            bail!("drone.server must be set (or DRONE_SERVER)");
        };
        if server.cannot_be_a_base() {
            bail!("drone.server is not a base URL: {}", server);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
drone:
  server: https://drone.example.com
  token: secret
dashboard:
  org: metwork-framework
  topics: [integration-level-2, integration-level-1]
  exclude_repos: [testrepo]
  branches: [integration, master]
  exclusions:
    - { repo: mflog, branch: integration }
"#;

    #[test]
    fn parses_with_defaults() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.templates, "templates");
        assert_eq!(config.drone.max_pages, 10);
        assert_eq!(config.drone.timeout_secs, 20);
        assert_eq!(config.dashboard.max_concurrent_lookups, 32);
        assert_eq!(config.dashboard.exclusions, vec![ExclusionRule {
            repo: "mflog".to_string(),
            branch: "integration".to_string(),
        }]);
        assert!(config.github.token.is_none());
    }

    #[test]
    fn env_overrides_credentials() {
        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config
            .apply_env(|key| match key {
                "DRONE_SERVER" => Some("https://ci.example.org/".to_string()),
                "DRONE_TOKEN" => Some("from-env".to_string()),
                "GITHUB_TOKEN" => Some("gh".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.drone.server.as_ref().map(Url::as_str), Some("https://ci.example.org/"));
        assert_eq!(config.drone.token, "from-env");
        assert_eq!(config.github.token.as_deref(), Some("gh"));
    }

    #[test]
    fn rejects_missing_token_and_branches() {
        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config.drone.token.clear();
        assert!(config.validate().is_err());

        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config.dashboard.branches.clear();
        assert!(config.validate().is_err());

        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        config.drone.server = Some(Url::parse("mailto:ci@example.com").unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn drone_server_from_env_only() {
        const NO_SERVER: &str = r#"
drone:
  token: secret
dashboard:
  org: metwork-framework
  topics: [integration-level-1]
  branches: [master]
"#;
        let mut config: Config = serde_yaml::from_str(NO_SERVER).unwrap();
        assert!(config.drone.server.is_none());
        assert!(config.validate().is_err());

        config
            .apply_env(|key| (key == "DRONE_SERVER").then(|| "https://drone.example.com".to_string()))
            .unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.drone.server.as_ref().map(Url::as_str),
            Some("https://drone.example.com/")
        );
    }

    #[test]
    fn parses_unix_socket() {
        let config: Config =
            serde_yaml::from_str(&format!("server:\n  socket: /run/dashboard.sock\n{CONFIG}")).unwrap();
        assert_eq!(config.server.socket, Some(PathBuf::from("/run/dashboard.sock")));
        assert_eq!(config.server.port, 8080);
    }
}
