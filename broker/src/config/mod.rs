use serde::Deserialize;
use std::path::Path;

use crate::error::Error;

mod general;
mod listener;
mod log;
mod security;

pub use general::General;
pub use listener::{Listener, Protocol};
pub use log::{Log, LogLevel};
pub use security::Security;

/// Top-level broker configuration, loaded from TOML (spec §6's enumerated
/// config surface).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "General::default")]
    general: General,

    #[serde(default = "Listener::default_listeners")]
    listeners: Vec<Listener>,

    #[serde(default = "Security::default")]
    security: Security,

    #[serde(default = "Log::default")]
    log: Log,
}

impl Config {
    /// # Errors
    /// Returns an error if the file can't be read or doesn't parse as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|err| Error::new(crate::error::ErrorKind::Config, format!("{err}")))
    }

    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    /// Mutable access for applying CLI overrides (e.g. `--bind-address`)
    /// after the file is loaded.
    pub fn listeners_mut(&mut self) -> &mut [Listener] {
        &mut self.listeners
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// # Errors
    /// Returns an error if any section fails its own validation.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        self.general.validate()?;
        for listener in &self.listeners {
            listener.validate(bind_address)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listeners().len(), 1);
        assert_eq!(config.listeners()[0].address(), "0.0.0.0:1883");
        assert!(config.security().allow_anonymous());
    }
}
