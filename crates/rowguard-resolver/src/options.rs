// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;

use thiserror::Error;

pub const CHECK_REQUIRED_BELONGS_TO_ENV: &str = "ROWGUARD_CHECK_REQUIRED_BELONGS_TO";

/// Where engine options are read from.
pub trait Environment: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("{key} must be an on/off switch (true, 1, yes, on, enabled or false, 0, no, off, disabled), got '{value}'")]
    InvalidSwitch { key: String, value: String },
}

fn switch(env: &dyn Environment, key: &str) -> Result<Option<bool>, EnvError> {
    let Some(value) = env.get(key) else {
        return Ok(None);
    };

    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" | "enable" => Ok(Some(true)),
        "false" | "0" | "no" | "off" | "disabled" | "disable" => Ok(Some(false)),
        _ => Err(EnvError::InvalidSwitch {
            key: key.to_string(),
            value,
        }),
    }
}

/// Engine-wide switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlsOptions {
    /// Verify, after each query, that every returned required to-one relation is itself readable.
    ///
    /// Requires the nested selection of such relations to include the target's primary key.
    pub check_required_belongs_to: bool,
}

impl RlsOptions {
    pub fn from_env(env: &dyn Environment) -> Result<Self, EnvError> {
        Ok(Self {
            check_required_belongs_to: switch(env, CHECK_REQUIRED_BELONGS_TO_ENV)?
                .unwrap_or_default(),
        })
    }
}
