// ABOUTME: PEM-style text container used for backup files: a labelled block, Key: Value headers, base64 body.
// ABOUTME: The codec is agnostic to what the body holds; callers pick the inner encoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

const BEGIN_PREFIX: &str = "-----BEGIN ";
const END_PREFIX: &str = "-----END ";
const DASHES: &str = "-----";
const LINE_WIDTH: usize = 64;

/// Errors that can occur while decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("no BEGIN line found")]
    MissingBegin,

    #[error("no END line found for block '{0}'")]
    MissingEnd(String),

    #[error("END label '{end}' does not match BEGIN label '{begin}'")]
    LabelMismatch { begin: String, end: String },

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("not a text file: {0}")]
    NotText(#[from] std::str::Utf8Error),
}

/// A decoded envelope. Headers keep the order they were written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub label: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Create an envelope with the given type label, no headers, and an empty body.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Value of the first header with exactly this name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Render the envelope as ASCII text. Headers are followed by a blank line,
    /// and the base64 body is wrapped at 64 columns.
    pub fn encode(&self) -> String {
        let mut out = format!("{BEGIN_PREFIX}{}{DASHES}\n", self.label);

        for (key, value) in &self.headers {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        if !self.headers.is_empty() {
            out.push('\n');
        }

        let encoded = STANDARD.encode(&self.body);
        for (i, ch) in encoded.chars().enumerate() {
            if i > 0 && i % LINE_WIDTH == 0 {
                out.push('\n');
            }
            out.push(ch);
        }
        if !encoded.is_empty() {
            out.push('\n');
        }

        out.push_str(&format!("{END_PREFIX}{}{DASHES}\n", self.label));
        out
    }

    /// Parse the first block found in `input`. Text before the BEGIN line is ignored.
    pub fn decode(input: &str) -> Result<Self, EnvelopeError> {
        let mut lines = input.lines().map(|line| line.trim_end_matches('\r'));

        let label = lines
            .by_ref()
            .find_map(|line| line.strip_prefix(BEGIN_PREFIX)?.strip_suffix(DASHES))
            .ok_or(EnvelopeError::MissingBegin)?
            .to_string();

        let mut headers = Vec::new();
        let mut encoded = String::new();
        let mut in_headers = true;

        for line in lines {
            if let Some(end) = line
                .strip_prefix(END_PREFIX)
                .and_then(|rest| rest.strip_suffix(DASHES))
            {
                if end != label {
                    return Err(EnvelopeError::LabelMismatch {
                        begin: label,
                        end: end.to_string(),
                    });
                }
                let body = STANDARD.decode(encoded.as_bytes())?;
                return Ok(Self {
                    label,
                    headers,
                    body,
                });
            }

            if in_headers {
                if line.trim().is_empty() {
                    in_headers = false;
                    continue;
                }
                // The base64 alphabet has no ':', so any such line is a header.
                if let Some((key, value)) = line.split_once(':') {
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(EnvelopeError::MalformedHeader(line.to_string()));
                    }
                    headers.push((key.to_string(), value.trim().to_string()));
                    continue;
                }
                in_headers = false;
            }

            encoded.push_str(line.trim());
        }

        Err(EnvelopeError::MissingEnd(label))
    }
}
