use crate::error::{config_error, env_error, CalendarResult};
use crate::utils::time::parse_time_zone;
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the accounts file
pub const DEFAULT_ACCOUNTS_FILE: &str = "config/accounts.toml";
/// Default directory for stored OAuth tokens
pub const DEFAULT_TOKEN_DIR: &str = "tokens";
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
/// Port used for CalDAV servers when none is configured
pub const DEFAULT_CALDAV_PORT: u16 = 80;

/// Main configuration structure for the service
#[derive(Debug, Clone)]
pub struct Config {
    /// TOML file listing the accounts
    pub accounts_file: PathBuf,
    /// How often every account is reconciled
    pub refresh_interval: Duration,
    /// Upper bound for a single provider call
    pub provider_timeout: Duration,
    /// Display time zone, also used for local times without an offset
    pub timezone: String,
    /// Directory holding one OAuth token file per Google account
    pub token_dir: PathBuf,
    /// Configured accounts
    pub accounts: Vec<AccountConfig>,
}

/// One `[[accounts]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Caldav(CalDavConfig),
    Google(GoogleConfig),
    Exchange(ExchangeConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Caldav(_) => "caldav",
            ProviderConfig::Google(_) => "google",
            ProviderConfig::Exchange(_) => "exchange",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalDavConfig {
    pub host: String,
    #[serde(default = "default_caldav_port")]
    pub port: u16,
    /// Collection path, e.g. `/calendars/me/work`
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Use https instead of http
    #[serde(default)]
    pub tls: bool,
}

impl CalDavConfig {
    /// Base URL of the calendar collection, always ending in `/`
    pub fn collection_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}/", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", scheme, self.host, self.port, path)
        }
    }
}

fn default_caldav_port() -> u16 {
    DEFAULT_CALDAV_PORT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Falls back to `GOOGLE_CLIENT_ID`
    #[serde(default)]
    pub client_id: String,
    /// Falls back to `GOOGLE_CLIENT_SECRET`
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Server version label such as `"2010 SP1"`
    #[serde(default)]
    pub version: Option<String>,
    /// EWS endpoint, e.g. `https://mail.example.com/EWS/Exchange.asmx`
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub autodiscover: bool,
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<AccountConfig>,
}

impl Config {
    /// Load configuration from environment and the accounts file
    pub fn load() -> CalendarResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let accounts_file = env::var("CALENDAR_ACCOUNTS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ACCOUNTS_FILE));

        let refresh_interval = duration_var("REFRESH_INTERVAL", DEFAULT_REFRESH_INTERVAL)?;
        let provider_timeout = duration_var("PROVIDER_TIMEOUT", DEFAULT_PROVIDER_TIMEOUT)?;

        // Default timezone
        let timezone = env::var("TIMEZONE").unwrap_or_else(|_| String::from("UTC"));

        let token_dir = env::var("TOKEN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_DIR));

        let content = fs::read_to_string(&accounts_file).map_err(|e| {
            config_error(&format!(
                "Failed to read accounts file {}: {}",
                accounts_file.display(),
                e
            ))
        })?;
        let mut accounts = Self::parse_accounts(&content)?;
        apply_google_env_defaults(&mut accounts);

        let config = Config {
            accounts_file,
            refresh_interval,
            provider_timeout,
            timezone,
            token_dir,
            accounts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from accounts TOML, with defaults for the rest
    pub fn from_toml_str(content: &str) -> CalendarResult<Self> {
        let config = Config {
            accounts_file: PathBuf::from(DEFAULT_ACCOUNTS_FILE),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            timezone: String::from("UTC"),
            token_dir: PathBuf::from(DEFAULT_TOKEN_DIR),
            accounts: Self::parse_accounts(content)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn parse_accounts(content: &str) -> CalendarResult<Vec<AccountConfig>> {
        let file: AccountsFile = toml::from_str(content)?;
        Ok(file.accounts)
    }

    /// Display time zone as a chrono-tz zone
    pub fn time_zone(&self) -> CalendarResult<Tz> {
        parse_time_zone(&self.timezone)
    }

    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Reject configurations the service cannot start with
    pub fn validate(&self) -> CalendarResult<()> {
        self.time_zone()
            .map_err(|_| config_error(&format!("Unknown time zone '{}'", self.timezone)))?;

        if self.refresh_interval.is_zero() {
            return Err(config_error("REFRESH_INTERVAL must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(config_error("Account name must not be empty"));
            }
            if !seen.insert(account.name.as_str()) {
                return Err(config_error(&format!(
                    "Duplicate account name '{}'",
                    account.name
                )));
            }

            match &account.provider {
                ProviderConfig::Caldav(caldav) if caldav.host.trim().is_empty() => {
                    return Err(config_error(&format!(
                        "CalDAV account '{}' needs a host",
                        account.name
                    )));
                }
                ProviderConfig::Exchange(exchange) => {
                    if exchange.autodiscover {
                        return Err(config_error(&format!(
                            "Exchange account '{}': autodiscovery is not supported, set url",
                            account.name
                        )));
                    }
                    if exchange.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                        return Err(config_error(&format!(
                            "Exchange account '{}' needs an EWS url",
                            account.name
                        )));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn duration_var(name: &str, default: Duration) -> CalendarResult<Duration> {
    match env::var(name) {
        Ok(value) => humantime::parse_duration(value.trim()).map_err(|_| env_error(name)),
        Err(_) => Ok(default),
    }
}

fn apply_google_env_defaults(accounts: &mut [AccountConfig]) {
    let client_id = env::var("GOOGLE_CLIENT_ID").ok();
    let client_secret = env::var("GOOGLE_CLIENT_SECRET").ok();

    for account in accounts {
        if let ProviderConfig::Google(google) = &mut account.provider {
            if google.client_id.is_empty() {
                if let Some(id) = &client_id {
                    google.client_id = id.clone();
                }
            }
            if google.client_secret.is_empty() {
                if let Some(secret) = &client_secret {
                    google.client_secret = secret.clone();
                }
            }
        }
    }
}
