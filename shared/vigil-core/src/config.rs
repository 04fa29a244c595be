//! Configuration management for microservices

use crate::error::{Result, VigilError};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::process())
    }

    pub fn from_source<F>(source: &EnvSource<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            service_name: source.var_or("SERVICE_NAME", "unknown"),
        })
    }
}

/// Variable lookup used by every service config.
///
/// Empty values are treated as unset, so `FOO=` in a compose file falls back
/// to the default instead of failing to parse.
pub struct EnvSource<F> {
    lookup: F,
}

impl EnvSource<fn(&str) -> Option<String>> {
    /// Lookup backed by the process environment
    pub fn process() -> Self {
        fn lookup(key: &str) -> Option<String> {
            env::var(key).ok()
        }
        Self { lookup }
    }
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    pub fn var_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| VigilError::Config(format!("Invalid {}: {}", key, e))),
            None => Ok(default),
        }
    }

    /// Fetch every key, reporting all missing ones in a single error.
    pub fn require_all<const N: usize>(&self, keys: [&str; N]) -> Result<[String; N]> {
        let values = keys.map(|key| self.get(key));
        let missing: Vec<&str> = keys
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| *key)
            .collect();

        if !missing.is_empty() {
            return Err(VigilError::Config(format!(
                "missing required variables: {}",
                missing.join(", ")
            )));
        }
        Ok(values.map(Option::unwrap_or_default))
    }
}
