//! Operator-supplied settings: credentials, customer name and custom rules.
//!
//! Settings are entered at runtime (not baked into `ParleyConfig`) and persisted as TOML
//! so they survive a restart of the gateway.

use crate::error::{CoreError, CoreResult};
use crate::persist::write_atomic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

fn default_instance_user() -> String {
    "admin".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    /// Ticketing instance identifier (`acme` for `acme.service-now.com`).
    #[serde(default)]
    pub instance_name: String,
    #[serde(default = "default_instance_user")]
    pub instance_user: String,
    #[serde(default)]
    pub instance_password: String,
    #[serde(default)]
    pub customer_name: String,
    /// Free-text rules appended to the assistant's system prompt.
    #[serde(default)]
    pub custom_rules: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            instance_name: String::new(),
            instance_user: default_instance_user(),
            instance_password: String::new(),
            customer_name: String::new(),
            custom_rules: Vec::new(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &redact(&self.api_key))
            .field("instance_name", &self.instance_name)
            .field("instance_user", &self.instance_user)
            .field("instance_password", &redact(&self.instance_password))
            .field("customer_name", &self.customer_name)
            .field("custom_rules", &self.custom_rules.len())
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// The validated subset of `Settings` every remote call needs.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub instance_name: String,
    pub instance_user: String,
    pub instance_password: String,
    pub customer_name: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("instance_name", &self.instance_name)
            .field("instance_user", &self.instance_user)
            .field("instance_password", &"<redacted>")
            .field("customer_name", &self.customer_name)
            .finish()
    }
}

impl Settings {
    /// Check that the API key, instance name, instance password and customer name are set.
    pub fn require_complete(&self) -> CoreResult<Credentials> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("api_key");
        }
        if self.instance_name.trim().is_empty() {
            missing.push("instance_name");
        }
        if self.instance_password.is_empty() {
            missing.push("instance_password");
        }
        if self.customer_name.trim().is_empty() {
            missing.push("customer_name");
        }
        if !missing.is_empty() {
            return Err(CoreError::MissingSettings(missing));
        }

        Ok(Credentials {
            api_key: self.api_key.trim().to_string(),
            instance_name: self.instance_name.trim().to_string(),
            instance_user: self.instance_user.trim().to_string(),
            instance_password: self.instance_password.clone(),
            customer_name: self.customer_name.trim().to_string(),
        })
    }

    /// Load from `path`, returning defaults when the file does not exist yet.
    pub fn load_from_path(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        let content = toml::to_string_pretty(self)?;
        write_atomic(path, &content)?;
        Ok(())
    }

    /// Append one rule. Blank input is rejected.
    pub fn add_rule(&mut self, rule: &str) -> CoreResult<()> {
        let rule = rule.trim();
        if rule.is_empty() {
            return Err(CoreError::InvalidSettings("rule must not be blank".to_string()));
        }
        self.custom_rules.push(rule.to_string());
        Ok(())
    }

    /// Replace every rule with the non-blank lines of `text`.
    pub fn replace_rules(&mut self, text: &str) {
        self.custom_rules = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
    }

    /// Secrets left masked (or blank) in an edited copy are taken from `previous`.
    pub fn keep_secrets_from(&mut self, previous: &Settings) {
        if self.api_key.is_empty() || self.api_key == REDACTED {
            self.api_key = previous.api_key.clone();
        }
        if self.instance_password.is_empty() || self.instance_password == REDACTED {
            self.instance_password = previous.instance_password.clone();
        }
    }

    /// Copy of these settings with secrets blanked, for display.
    pub fn redacted(&self) -> Self {
        Self {
            api_key: redact_value(&self.api_key),
            instance_password: redact_value(&self.instance_password),
            ..self.clone()
        }
    }
}

/// Shown in place of a secret.
pub const REDACTED: &str = "********";

fn redact_value(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        REDACTED.to_string()
    }
}
