//! Generative completion service interaction.
//!
//! The completion endpoint is an OpenAI-compatible API reached through the
//! `awful_aj` library. This module keeps that dependency behind a small trait:
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`JadeClient`]: Implementation backed by an `awful_aj` config and chat template
//!
//! Requests are not retried here. A failed call is reported to the caller,
//! which treats it as fatal for the run.

use awful_aj::api::ask;
use awful_aj::{config, config_dir, template};
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait send text to an LLM and receive a response.
/// This abstraction allows the summarizer to run against in-memory fakes.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    ///
    /// # Arguments
    ///
    /// * `text` - The user payload sent after the template's system prompt
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// [`AskAsync`] implementation over `awful_aj`.
///
/// The config file and chat template are loaded on first use, so runs that
/// never summarize do not need LLM credentials.
///
/// # Template Selection
///
/// `template_name` picks the prompt variant (see
/// [`DigestCategory::template_name`](crate::config::DigestCategory::template_name)).
/// Templates live in the `awful_aj` config directory.
#[derive(Debug, Clone)]
pub struct JadeClient {
    /// Explicit path to `config.yaml`; defaults to `awful_aj`'s config dir.
    pub config_path: Option<PathBuf>,
    /// Name of the chat template to load.
    pub template_name: String,
}

impl JadeClient {
    pub fn new(config_path: Option<PathBuf>, template_name: impl Into<String>) -> Self {
        Self {
            config_path,
            template_name: template_name.into(),
        }
    }

    fn resolved_config_path(&self) -> Result<PathBuf, Box<dyn Error>> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("config.yaml")),
        }
    }
}

impl AskAsync for JadeClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(template = %self.template_name))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let config_path = self.resolved_config_path()?;
        let jade_config = config::load_config(&config_path.to_string_lossy())?;
        let chat_template = template::load_template(&self.template_name).await?;
        info!(config_path = %config_path.display(), "Loaded completion configuration");

        let t0 = Instant::now();
        let res = ask(&jade_config, text.to_string(), &chat_template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => info!(elapsed_ms = dt.as_millis() as u64, "Completion succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "Completion failed"),
        }
        res
    }
}
