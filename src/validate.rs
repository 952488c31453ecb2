use thiserror::Error;

use crate::config::Rules;
use crate::types::{DeschedulerSpec, Param};

/// A Descheduler that cannot be converged until its spec is edited.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("descheduler should have a schedule for the cron job set")]
    MissingSchedule,
    #[error("descheduler should have at least one strategy enabled and it should be one of {allowed}")]
    NoStrategySelected { allowed: String },
    #[error("descheduler should not have more strategies enabled than the {max} supported")]
    TooManyStrategies { max: usize },
    #[error("expected one of {allowed} to be enabled but found following invalid strategies {}", .found.join(","))]
    UnknownStrategy { allowed: String, found: Vec<String> },
    #[error("descheduler allows only following flags {allowed} but found {found}")]
    UnsupportedFlag { allowed: String, found: String },
}

impl Rules {
    /// Checks the names of the strategies requested in a Descheduler.
    pub fn validate_strategies<S: AsRef<str>>(&self, names: &[S]) -> Result<(), ValidationError> {
        if names.is_empty() {
            return Err(ValidationError::NoStrategySelected {
                allowed: self.strategies.join(","),
            });
        }
        if names.len() > self.strategies.len() {
            return Err(ValidationError::TooManyStrategies {
                max: self.strategies.len(),
            });
        }
        let unknown = names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| {
                !self
                    .strategies
                    .iter()
                    .any(|valid| valid.eq_ignore_ascii_case(name))
            })
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(ValidationError::UnknownStrategy {
                allowed: self.strategies.join(","),
                found: unknown,
            });
        }
        Ok(())
    }

    /// Turns requested flags into command line tokens. `None` means no flags
    /// were requested and the plain command should be used. Values are passed
    /// through unchecked.
    pub fn validate_flags(&self, flags: &[Param]) -> Result<Option<Vec<String>>, ValidationError> {
        if flags.is_empty() {
            return Ok(None);
        }
        let mut tokens = Vec::with_capacity(flags.len() * 2);
        for flag in flags {
            if !self.flags.iter().any(|valid| *valid == flag.name) {
                return Err(ValidationError::UnsupportedFlag {
                    allowed: self.flags.join(","),
                    found: flag.name.clone(),
                });
            }
            tokens.push(format!("--{}", flag.name));
            tokens.push(flag.value.clone());
        }
        Ok(Some(tokens))
    }

    /// Everything that has to hold before a pass may touch the cluster.
    pub fn validate_spec(
        &self,
        spec: &DeschedulerSpec,
    ) -> Result<Option<Vec<String>>, ValidationError> {
        if spec.schedule.is_empty() {
            return Err(ValidationError::MissingSchedule);
        }
        let names = spec
            .strategies
            .iter()
            .map(|strategy| strategy.name.as_str())
            .collect::<Vec<_>>();
        self.validate_strategies(&names)?;
        self.validate_flags(&spec.flags)
    }
}
