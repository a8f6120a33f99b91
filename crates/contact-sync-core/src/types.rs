//! Small closed enums shared across the data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The type of a channel associated with a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// An email channel.
    Email,
    /// An SMS channel.
    Sms,
    /// An open channel (platform defined by the application).
    Open,
}

impl ChannelType {
    /// Stable string form, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "open" => Ok(Self::Open),
            other => Err(CoreError::UnknownChannelType(other.to_string())),
        }
    }
}

/// The channel scope a subscription list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    App,
    Web,
    Email,
    Sms,
}

impl Scope {
    /// Stable string form, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Web => "web",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(Self::App),
            "web" => Ok(Self::Web),
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(CoreError::UnknownScope(other.to_string())),
        }
    }
}
