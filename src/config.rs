use crate::agdev::{BatchOptions, TransportConfig, WaitOptions};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::{env, path::PathBuf, time::Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// File with one company name per line (a first CSV column also works)
    #[arg(short = 'f', long, env = "COMPANIES_FILE")]
    pub companies: PathBuf,

    /// Config file path
    #[arg(short, long, env = "OUTREACH_CONFIG")]
    pub config: Option<String>,

    /// Directory for JSON snapshots
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Create Gmail drafts for the generated emails through Arcade
    #[arg(long)]
    pub draft_emails: bool,

    /// Maximum runs in flight per batch (0 = unbounded)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Delay between run status polls
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Give up on a run after this long (0 = wait forever)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agdev: ApiConfig,
    #[serde(default)]
    pub agents: AgentIds,
    pub arcade: ArcadeConfig,
    pub polling: PollingConfig,
    pub batch: BatchConfig,
    pub output: OutputConfig,
}

#[derive(Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct AgentIds {
    #[serde(default)]
    pub company_profile: String,
    #[serde(default)]
    pub contacts: String,
    #[serde(default)]
    pub contact_profile: String,
    #[serde(default)]
    pub outreach_email: String,
}

#[derive(Deserialize, Clone)]
pub struct ArcadeConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl std::fmt::Debug for ArcadeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcadeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    /// Deadline for each HTTP request (0 = none).
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    /// 0 means unbounded.
    pub concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub draft_emails: bool,
}

/// Plain environment variable names mapped onto config keys.
const DIRECT_ENV: &[(&str, &str)] = &[
    ("AG_API_KEY", "agdev.api_key"),
    ("AG_BASE_URL", "agdev.base_url"),
    ("COMPANY_PROFILE_AGENT_ID", "agents.company_profile"),
    ("CONTACTS_AGENT_ID", "agents.contacts"),
    ("CONTACT_PROFILE_AGENT_ID", "agents.contact_profile"),
    ("OUTREACH_EMAIL_AGENT_ID", "agents.outreach_email"),
    ("ARCADE_API_KEY", "arcade.api_key"),
    ("ARCADE_BASE_URL", "arcade.base_url"),
    ("ARCADE_USER_ID", "arcade.user_id"),
];

impl AppConfig {
    pub fn load() -> Result<(Cli, Self), config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<(Cli, Self), config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        // Kept as a clap error so the caller can print help/version and exit.
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;
        let config = Self::from_cli(&cli)?;
        Ok((cli, config))
    }

    /// Resolve configuration. Priority: CLI flag > env > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("agdev.base_url", "https://api.ag.dev")?
            .set_default("arcade.base_url", "https://api.arcade.dev")?
            .set_default("polling.interval_ms", 1000)?
            .set_default("polling.timeout_ms", 0)?
            .set_default("polling.request_timeout_ms", 30_000)?
            .set_default("batch.concurrency", 0)?
            .set_default("output.dir", "output")?
            .set_default("output.draft_emails", false)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else {
            builder = builder.add_source(File::with_name("outreach").required(false));
        }

        // OUTREACH_AGDEV__API_KEY=... style overrides
        builder = builder.add_source(
            Environment::with_prefix("OUTREACH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in DIRECT_ENV {
            if let Ok(val) = env::var(var) {
                if !val.trim().is_empty() {
                    builder = builder.set_override(*key, val)?;
                }
            }
        }

        if let Some(dir) = &cli.output_dir {
            builder = builder.set_override("output.dir", dir.to_string_lossy().to_string())?;
        }
        if cli.draft_emails {
            builder = builder.set_override("output.draft_emails", true)?;
        }
        if let Some(n) = cli.concurrency {
            builder = builder.set_override("batch.concurrency", n as u64)?;
        }
        if let Some(ms) = cli.poll_interval_ms {
            builder = builder.set_override("polling.interval_ms", ms)?;
        }
        if let Some(ms) = cli.timeout_ms {
            builder = builder.set_override("polling.timeout_ms", ms)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.agdev.api_key.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "Missing required setting: AG_API_KEY".to_string(),
            ));
        }
        let missing: Vec<&str> = [
            ("COMPANY_PROFILE_AGENT_ID", &self.agents.company_profile),
            ("CONTACTS_AGENT_ID", &self.agents.contacts),
            ("CONTACT_PROFILE_AGENT_ID", &self.agents.contact_profile),
            ("OUTREACH_EMAIL_AGENT_ID", &self.agents.outreach_email),
        ]
        .into_iter()
        .filter(|(_, id)| id.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(config::ConfigError::Message(format!(
                "Missing agent ids: {}",
                missing.join(", ")
            )));
        }
        if self.polling.interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "polling.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.output.draft_emails {
            let has_key = self
                .arcade
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty());
            if !has_key || self.arcade.user_id.is_none() {
                return Err(config::ConfigError::Message(
                    "Drafting emails requires ARCADE_API_KEY and ARCADE_USER_ID".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn agdev_transport(&self) -> TransportConfig {
        TransportConfig::new(&self.agdev.base_url, &self.agdev.api_key)
            .with_request_timeout(self.request_timeout())
    }

    /// Arcade transport settings, when an API key is configured.
    pub fn arcade_transport(&self) -> Option<TransportConfig> {
        self.arcade
            .api_key
            .as_ref()
            .map(|key| {
                TransportConfig::new(&self.arcade.base_url, key)
                    .with_bearer_auth()
                    .with_request_timeout(self.request_timeout())
            })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.request_timeout_ms)
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::from_millis(self.polling.interval_ms, self.polling.timeout_ms)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            wait: self.wait_options(),
            concurrency: None,
        }
        .with_concurrency(self.batch.concurrency)
    }
}
