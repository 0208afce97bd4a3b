use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use splitwise_ynab::Tz;
use splitwise_ynab::model::FlagColor;
use splitwise_ynab::splitwise::Credentials;
use splitwise_ynab::sync::LedgerNames;
use std::path::{Path, PathBuf};

pub const DEFAULT_FLAG_COLOR: FlagColor = FlagColor::Purple;
pub const DEFAULT_GROUP_NAME: &str = "Household";
pub const DEFAULT_TIMEZONE: &str = "Australia/Sydney";

/// Settings merged from the config file and the environment.
///
/// Values are checked lazily by [`Config::state`] and [`Config::sync`], so
/// commands that never talk to the APIs don't need credentials.
#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    sw_consumer_key: Option<String>,
    sw_consumer_secret: Option<String>,
    sw_api_key: Option<String>,
    ynab_personal_access_token: Option<String>,
    ynab_budget_name: Option<String>,
    ynab_account_name: Option<String>,
    ynab_flag_color: Option<String>,
    sw_group_name: Option<String>,
    user_timezone: Option<String>,
    sync_state_dir: Option<PathBuf>,
}

/// Where and in which timezone sync progress is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    pub dir: PathBuf,
    pub timezone: Tz,
}

pub struct SyncConfig {
    pub splitwise: Credentials,
    pub ynab_access_token: String,
    pub budget_name: String,
    pub account_name: String,
    pub group_name: String,
    /// `None` disables YNAB→Splitwise.
    pub flag_color: Option<FlagColor>,
}

impl SyncConfig {
    pub fn names(&self) -> LedgerNames<'_> {
        LedgerNames {
            budget: &self.budget_name,
            account: &self.account_name,
            group: &self.group_name,
        }
    }
}

impl Config {
    /// Reads `path`, or the first config file found in the working directory,
    /// then applies overrides from `env`.
    pub fn load(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::find_and_load()?.unwrap_or_default(),
        };
        config.apply_env(env);
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let base_dir = path.parent().map(ToOwned::to_owned).unwrap_or_default();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.sync_state_dir = config.sync_state_dir.map(|dir| base_dir.join(dir));

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn find_and_load() -> Result<Option<Self>> {
        let config_locations = [
            Path::new("splitwise-ynab.toml"),
            Path::new(".splitwise-ynab.toml"),
        ];

        for location in &config_locations {
            if location.exists() {
                return Self::load_from_file(location).map(Some);
            }
        }

        Ok(None)
    }

    /// Overrides values with `NAME` or `name` from the environment.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| env(&key.to_uppercase()).or_else(|| env(key));

        let fields = [
            ("sw_consumer_key", &mut self.sw_consumer_key),
            ("sw_consumer_secret", &mut self.sw_consumer_secret),
            ("sw_api_key", &mut self.sw_api_key),
            ("ynab_personal_access_token", &mut self.ynab_personal_access_token),
            ("ynab_budget_name", &mut self.ynab_budget_name),
            ("ynab_account_name", &mut self.ynab_account_name),
            ("ynab_flag_color", &mut self.ynab_flag_color),
            ("sw_group_name", &mut self.sw_group_name),
            ("user_timezone", &mut self.user_timezone),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key) {
                *field = Some(value);
            }
        }
        if let Some(dir) = lookup("sync_state_dir") {
            self.sync_state_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn state(&self) -> Result<StateConfig> {
        let timezone = match self.user_timezone.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_TIMEZONE,
            Some(name) => name,
        };
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid user_timezone '{timezone}': {e}"))?;

        Ok(StateConfig {
            dir: self
                .sync_state_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            timezone,
        })
    }

    pub fn sync(&self) -> Result<SyncConfig> {
        let flag_color = match self.ynab_flag_color.as_deref().map(str::trim) {
            None => Some(DEFAULT_FLAG_COLOR),
            Some(value) if value.is_empty() || value.eq_ignore_ascii_case("none") => None,
            Some(value) => Some(
                value
                    .parse::<FlagColor>()
                    .map_err(|e| anyhow!("invalid ynab_flag_color: {e}"))?,
            ),
        };

        Ok(SyncConfig {
            splitwise: Credentials {
                consumer_key: required("sw_consumer_key", &self.sw_consumer_key)?,
                consumer_secret: required("sw_consumer_secret", &self.sw_consumer_secret)?,
                api_key: required("sw_api_key", &self.sw_api_key)?,
            },
            ynab_access_token: required(
                "ynab_personal_access_token",
                &self.ynab_personal_access_token,
            )?,
            budget_name: required("ynab_budget_name", &self.ynab_budget_name)?,
            account_name: required("ynab_account_name", &self.ynab_account_name)?,
            group_name: self
                .sw_group_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GROUP_NAME.to_owned()),
            flag_color,
        })
    }
}

fn required(key: &str, value: &Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => bail!(
            "missing required setting '{key}': set {} or add it to the config file",
            key.to_uppercase()
        ),
    }
}
