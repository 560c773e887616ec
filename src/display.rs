//! Terminal rendering of serial traffic.
//!
//! Bytes stay opaque inside the session; this is where they become text.

use crate::config::ConfigError;
use crate::session::ReceivedChunk;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How received bytes are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// UTF-8, with invalid sequences replaced.
    #[default]
    Text,
    /// Space-separated uppercase hex pairs.
    Hex,
}

impl FromStr for DisplayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "hex" => Ok(Self::Hex),
            _ => Err(ConfigError::invalid_value(
                "display mode",
                s,
                "'text' or 'hex'",
            )),
        }
    }
}

/// Terminator appended to every line sent from the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    None,
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::None => b"",
            Self::Lf => b"\n",
            Self::Crlf => b"\r\n",
        }
    }
}

impl FromStr for LineEnding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lf" => Ok(Self::Lf),
            "crlf" => Ok(Self::Crlf),
            _ => Err(ConfigError::invalid_value(
                "line ending",
                s,
                "'none', 'lf' or 'crlf'",
            )),
        }
    }
}

/// Render a received chunk for output.
pub fn render_chunk(chunk: &ReceivedChunk, mode: DisplayMode, timestamps: bool) -> String {
    let body = match mode {
        DisplayMode::Text => String::from_utf8_lossy(&chunk.bytes).into_owned(),
        DisplayMode::Hex => {
            let mut spaced = hex_pairs(&chunk.bytes);
            spaced.push('\n');
            spaced
        }
    };

    if timestamps {
        let at = chunk.timestamp.with_timezone(&Local).format("%H:%M:%S%.3f");
        format!("[{at}] {body}")
    } else {
        body
    }
}

fn hex_pairs(bytes: &[u8]) -> String {
    let encoded = hex::encode_upper(bytes);
    let mut out = String::with_capacity(encoded.len() + bytes.len());
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(std::str::from_utf8(pair).unwrap_or("??"));
    }
    out
}

/// Turn one line of user input into a payload.
///
/// Surrounding whitespace is stripped. A line with nothing left yields an
/// empty payload (no terminator), which the session rejects.
pub fn encode_line(line: &str, ending: LineEnding) -> Vec<u8> {
    let content = line.trim();
    if content.is_empty() {
        return Vec::new();
    }
    let mut payload = Vec::with_capacity(content.len() + 2);
    payload.extend_from_slice(content.as_bytes());
    payload.extend_from_slice(ending.as_bytes());
    payload
}

/// Echo line for data the user sent.
pub fn render_sent(line: &str) -> String {
    format!("[sent] {}\n", line.trim())
}
