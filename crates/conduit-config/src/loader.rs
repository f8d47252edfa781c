use std::path::Path;

use anyhow::Context;

use crate::{AnyOrArray, Config};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;

        let config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_agent()?;
        self.validate_rate_limits()?;
        self.validate_credentials()?;
        self.validate_llm()?;
        self.validate_cors()?;
        Ok(())
    }

    fn validate_agent(&self) -> anyhow::Result<()> {
        let agent = &self.agent;

        if agent.command.as_os_str().is_empty() {
            anyhow::bail!("agent.command must not be empty");
        }

        if agent.max_sessions == 0 {
            anyhow::bail!("agent.max_sessions must be greater than 0");
        }

        if let Some(ref dir) = agent.sandbox.working_directory
            && !dir.is_absolute()
        {
            anyhow::bail!("agent.sandbox.working_directory must be an absolute path");
        }

        if agent.idle_timeout.is_zero() || agent.acquire_timeout.is_zero() {
            anyhow::bail!("agent timeouts must be greater than 0");
        }

        Ok(())
    }

    fn validate_rate_limits(&self) -> anyhow::Result<()> {
        if self.server.request_timeout.is_zero() {
            anyhow::bail!("server.request_timeout must be greater than 0");
        }

        let Some(ref rate_limit) = self.server.rate_limit else {
            return Ok(());
        };

        for (scope, limit) in [("global", &rate_limit.global), ("per_client", &rate_limit.per_client)] {
            if let Some(limit) = limit {
                if limit.requests == 0 {
                    anyhow::bail!("server.rate_limit.{scope}.requests must be greater than 0");
                }
                if limit.window.is_zero() {
                    anyhow::bail!("server.rate_limit.{scope}.window must be greater than 0");
                }
            }
        }

        Ok(())
    }

    fn validate_credentials(&self) -> anyhow::Result<()> {
        if self.credentials.resolved_path().is_none() {
            anyhow::bail!("credentials.path must be set when HOME is not available");
        }

        if self.credentials.client_id.is_empty() {
            anyhow::bail!("credentials.client_id must not be empty");
        }

        Ok(())
    }

    fn validate_cors(&self) -> anyhow::Result<()> {
        let Some(ref cors) = self.server.cors else {
            return Ok(());
        };

        // tower-http refuses credentials combined with any wildcard
        if cors.credentials
            && [&cors.origins, &cors.methods, &cors.headers]
                .into_iter()
                .any(|list| *list == AnyOrArray::Any)
        {
            anyhow::bail!("server.cors.credentials requires explicit origins, methods and headers");
        }

        Ok(())
    }

    fn validate_llm(&self) -> anyhow::Result<()> {
        if self.llm.default_max_tokens == 0 {
            anyhow::bail!("llm.default_max_tokens must be greater than 0");
        }

        if let Some(temperature) = self.llm.default_temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            anyhow::bail!("llm.default_temperature must be between 0.0 and 2.0");
        }

        Ok(())
    }
}
