//! Run configuration.
//!
//! Settings are resolved once at startup into an immutable [`Config`] that is
//! passed by reference into every component. Sources, highest priority first:
//!
//! 1. command-line flags and environment variables (including `.env`)
//! 2. the optional YAML settings file (`--config`)
//! 3. built-in defaults
//!
//! Empty strings count as unset at every level.

use crate::cli::Cli;
use crate::delivery::PART_HEADER_RESERVE;
use crate::error::DigestError;
use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_FOLDER_NAME: &str = "GPT";
/// Largest text the bot transport accepts in one message.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

static BOT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").expect("static regex"));

/// Prompt variant for the digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DigestCategory {
    #[default]
    General,
    Sport,
}

impl DigestCategory {
    /// Name of the chat template used for this variant.
    pub fn template_name(self) -> &'static str {
        match self {
            DigestCategory::General => "channel_digest",
            DigestCategory::Sport => "sport_digest",
        }
    }
}

/// Optional YAML settings file. Secrets are deliberately not read from here.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub data_dir: Option<PathBuf>,
    pub folder_name: Option<String>,
    pub subscribers_file: Option<PathBuf>,
    pub llm_config: Option<PathBuf>,
    pub category: Option<DigestCategory>,
    pub debug_user_ids: Option<Vec<i64>>,
    pub debug_mode: Option<bool>,
    pub send_pacing_ms: Option<u64>,
    pub probe_pacing_ms: Option<u64>,
    pub max_message_len: Option<usize>,
    pub preview_chars: Option<usize>,
    pub max_payload_chars: Option<usize>,
}

impl Settings {
    pub fn from_yaml(raw: &str) -> Result<Self, DigestError> {
        serde_yaml::from_str(raw).map_err(|e| DigestError::Config(format!("settings file: {e}")))
    }

    pub async fn load(path: &Path) -> Result<Self, DigestError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DigestError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub subscribers_file: PathBuf,
    pub channels_file: PathBuf,
    pub summaries_log: PathBuf,
    pub sent_messages_log: PathBuf,
    pub inbound_log: PathBuf,
    pub session_file: PathBuf,
    pub folder_name: String,
    pub llm_config: Option<PathBuf>,
    pub category: DigestCategory,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub bot_token: Option<String>,
    pub debug_user_ids: Vec<i64>,
    pub debug_mode: bool,
    /// Pause after each delivered chunk.
    pub send_pacing: Duration,
    /// Pause after each reachability probe.
    pub probe_pacing: Duration,
    pub max_message_len: usize,
    pub preview_chars: usize,
    pub max_payload_chars: usize,
}

impl Config {
    /// Defaults rooted at `data_dir`, with no credentials.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            subscribers_file: data_dir.join("subscribers.json"),
            channels_file: data_dir.join("channels.json"),
            summaries_log: data_dir.join("sent_summaries.log"),
            sent_messages_log: data_dir.join("sent_messages.log"),
            inbound_log: data_dir.join("user_messages.log"),
            session_file: data_dir.join("aggregator.session"),
            data_dir,
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            llm_config: None,
            category: DigestCategory::General,
            api_id: None,
            api_hash: None,
            bot_token: None,
            debug_user_ids: Vec::new(),
            debug_mode: false,
            send_pacing: Duration::from_millis(100),
            probe_pacing: Duration::from_millis(50),
            max_message_len: TELEGRAM_MAX_MESSAGE_LENGTH,
            preview_chars: 800,
            max_payload_chars: 400_000,
        }
    }

    /// Merge CLI/env values over settings-file values over defaults.
    pub fn resolve(cli: &Cli, settings: Settings) -> Result<Self, DigestError> {
        let data_dir = cli
            .data_dir
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or(settings.data_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::with_data_dir(&data_dir);

        if let Some(file) = cli
            .subscribers_file
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or(settings.subscribers_file)
        {
            config.subscribers_file = resolve_data_path(&data_dir, &file);
        }
        if let Some(folder) = non_empty(cli.folder_name.as_deref()).or(settings.folder_name) {
            config.folder_name = folder;
        }
        config.llm_config = cli
            .llm_config
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or(settings.llm_config);
        config.category = cli.category.or(settings.category).unwrap_or_default();

        config.api_id = match non_empty(cli.api_id.as_deref()) {
            Some(raw) => Some(raw.trim().parse::<i32>().map_err(|_| {
                DigestError::Config(format!("TELEGRAM_API_ID must be an integer, got {raw:?}"))
            })?),
            None => None,
        };
        config.api_hash = non_empty(cli.api_hash.as_deref());
        config.bot_token = non_empty(cli.bot_token.as_deref()).map(|t| t.trim().to_string());

        config.debug_user_ids = match non_empty(cli.debug_user_ids.as_deref()) {
            Some(raw) => parse_id_list(&raw),
            None => settings.debug_user_ids.unwrap_or_default(),
        };
        config.debug_mode = match non_empty(cli.debug_mode.as_deref()) {
            Some(raw) => parse_bool(&raw),
            None => settings
                .debug_mode
                .unwrap_or(!config.debug_user_ids.is_empty()),
        };

        if let Some(ms) = settings.send_pacing_ms {
            config.send_pacing = Duration::from_millis(ms);
        }
        if let Some(ms) = settings.probe_pacing_ms {
            config.probe_pacing = Duration::from_millis(ms);
        }
        if let Some(len) = settings.max_message_len {
            if len <= PART_HEADER_RESERVE || len > TELEGRAM_MAX_MESSAGE_LENGTH {
                return Err(DigestError::Config(format!(
                    "max_message_len must be within {}..={TELEGRAM_MAX_MESSAGE_LENGTH}",
                    PART_HEADER_RESERVE + 1
                )));
            }
            config.max_message_len = len;
        }
        if let Some(chars) = settings.preview_chars {
            config.preview_chars = chars;
        }
        if let Some(chars) = settings.max_payload_chars {
            config.max_payload_chars = chars;
        }

        debug!(?config.data_dir, folder = %config.folder_name, debug_mode = config.debug_mode, "Resolved configuration");
        Ok(config)
    }

    /// The bot token, validated for shape.
    pub fn require_bot_token(&self) -> Result<&str, DigestError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or(DigestError::MissingCredential("TELEGRAM_BOT_TOKEN"))?;
        if !BOT_TOKEN_RE.is_match(token) {
            return Err(DigestError::Config(
                "TELEGRAM_BOT_TOKEN does not look like <id>:<secret>".to_string(),
            ));
        }
        Ok(token)
    }

    /// Whether `user_id` should receive deliveries under the debug filter.
    pub fn is_targeted(&self, user_id: i64) -> bool {
        !self.debug_mode || self.debug_user_ids.contains(&user_id)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve `path` against the data directory unless it is absolute.
pub fn resolve_data_path(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

/// Parse `1,2,3` or `[1, 2, 3]`; entries that are not integers are ignored.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Truthy values: `1`, `true`, `yes`, `y`, `on` (case-insensitive).
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}
