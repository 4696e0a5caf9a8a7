// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the configuration module.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors that can occur while loading or reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required key is missing.
    #[error("configuration key not found: {0}")]
    NotFound(String),

    /// A value could not be parsed or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Reading a configuration source failed.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// A provider failed.
    #[error("provider error: {provider}: {message}")]
    ProviderError { provider: String, message: String },
}

impl ConfigError {
    pub fn provider_error<P: fmt::Display, M: fmt::Display>(provider: P, message: M) -> Self {
        Self::ProviderError {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}
