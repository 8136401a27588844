//! Settings read from the environment.

use std::borrow::Cow;
use std::env;
use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::time::Duration;

use tool_chat_core::LoopConfig;
use tool_chat_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

/// Where the tool gateway listens unless `TOOL_GATEWAY_URL` says otherwise.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8000/mcp";

/// Describes a configuration error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConfigError {
    var: &'static str,
    reason: Option<String>,
}

impl ConfigError {
    #[inline]
    fn missing(var: &'static str) -> Self {
        Self { var, reason: None }
    }

    #[inline]
    fn invalid<S: Into<String>>(var: &'static str, reason: S) -> Self {
        Self {
            var,
            reason: Some(reason.into()),
        }
    }

    /// Returns the name of the offending variable.
    #[inline]
    pub fn var(&self) -> &'static str {
        self.var
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Borrowed("not set"),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.reason())
    }
}

impl StdError for ConfigError {}

/// Everything the chat front end needs to start.
#[derive(Clone, Debug)]
pub struct Config {
    /// Model provider settings.
    pub openai: OpenAIConfig,
    /// Endpoint of the tool gateway.
    pub gateway_url: String,
    /// Limits of each conversation loop run.
    pub loop_config: LoopConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value
    /// of a variable if it is set.
    ///
    /// `OPENAI_API_KEY` is required. `OPENAI_BASE_URL`, `OPENAI_MODEL`,
    /// `TOOL_GATEWAY_URL`, `TOOL_CHAT_MAX_ITERATIONS` and
    /// `TOOL_CHAT_TIMEOUT_SECS` are optional, empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_key = lookup("OPENAI_API_KEY")
            .ok_or(ConfigError::missing("OPENAI_API_KEY"))?;
        let mut builder = OpenAIConfigBuilder::with_api_key(api_key);
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            builder = builder.with_model(model);
        }

        let gateway_url = lookup("TOOL_GATEWAY_URL")
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_owned());

        let mut loop_config = LoopConfig::default();
        if let Some(value) = lookup("TOOL_CHAT_MAX_ITERATIONS") {
            let max = parse_positive(
                "TOOL_CHAT_MAX_ITERATIONS",
                &value,
                u64::from(u32::MAX),
            )?;
            loop_config.max_iterations = Some(max as u32);
        }
        if let Some(value) = lookup("TOOL_CHAT_TIMEOUT_SECS") {
            let secs = parse_positive("TOOL_CHAT_TIMEOUT_SECS", &value, u64::MAX)?;
            loop_config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(Self {
            openai: builder.build(),
            gateway_url,
            loop_config,
        })
    }
}

fn parse_positive(
    var: &'static str,
    value: &str,
    max: u64,
) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(var, "must be positive")),
        Ok(n) if n > max => Err(ConfigError::invalid(var, "too large")),
        Ok(n) => Ok(n),
        Err(err) => Err(ConfigError::invalid(var, format!("{value:?}: {err}"))),
    }
}
