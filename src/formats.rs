//! # Input Formats
//!
//! Decoding of collections from serialization formats other than JSON. Each
//! non-JSON format sits behind its own cargo feature (`yaml`, `toml`,
//! `cbor`, `msgpack`); `all-formats` is enabled by default.

use std::fmt::Display;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde_json::Value;

/// A supported input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// JSON text
    #[default]
    Json,
    /// YAML text
    Yaml,
    /// TOML text
    Toml,
    /// Concise Binary Object Representation
    Cbor,
    /// MessagePack
    #[value(name = "msgpack")]
    MessagePack,
}

impl Format {
    /// Guess the format from a file extension. Unknown or missing
    /// extensions yield `None`.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" | "ndjson" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "cbor" => Some(Self::Cbor),
            "msgpack" | "mpk" => Some(Self::MessagePack),
            _ => None,
        }
    }

    /// Decode `bytes` into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed, or if support for the
    /// format was not compiled in.
    pub fn parse(self, bytes: &[u8]) -> Result<Value> {
        match self {
            Self::Json => {
                serde_json::from_slice(bytes).context("Failed to parse JSON")
            }
            Self::Yaml => parse_yaml(bytes),
            Self::Toml => parse_toml(bytes),
            Self::Cbor => parse_cbor(bytes),
            Self::MessagePack => parse_msgpack(bytes),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Cbor => "cbor",
            Self::MessagePack => "msgpack",
        };
        write!(f, "{name}")
    }
}

#[cfg(not(all(
    feature = "yaml",
    feature = "toml",
    feature = "cbor",
    feature = "msgpack"
)))]
fn missing_feature(format: Format) -> anyhow::Error {
    anyhow::anyhow!(
        "{format} input is not supported by this build (enable the `{format}` feature)"
    )
}

#[cfg(feature = "yaml")]
fn parse_yaml(bytes: &[u8]) -> Result<Value> {
    serde_yaml::from_slice(bytes).context("Failed to parse YAML")
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml(_: &[u8]) -> Result<Value> {
    Err(missing_feature(Format::Yaml))
}

#[cfg(feature = "toml")]
fn parse_toml(bytes: &[u8]) -> Result<Value> {
    let text = std::str::from_utf8(bytes).context("TOML input is not UTF-8")?;
    toml::from_str(text).context("Failed to parse TOML")
}

#[cfg(not(feature = "toml"))]
fn parse_toml(_: &[u8]) -> Result<Value> {
    Err(missing_feature(Format::Toml))
}

#[cfg(feature = "cbor")]
fn parse_cbor(bytes: &[u8]) -> Result<Value> {
    ciborium::from_reader(bytes).context("Failed to parse CBOR")
}

#[cfg(not(feature = "cbor"))]
fn parse_cbor(_: &[u8]) -> Result<Value> {
    Err(missing_feature(Format::Cbor))
}

#[cfg(feature = "msgpack")]
fn parse_msgpack(bytes: &[u8]) -> Result<Value> {
    rmp_serde::from_slice(bytes).context("Failed to parse MessagePack")
}

#[cfg(not(feature = "msgpack"))]
fn parse_msgpack(_: &[u8]) -> Result<Value> {
    Err(missing_feature(Format::MessagePack))
}
