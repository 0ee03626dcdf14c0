//! Lazy JSON decoding of the request payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{BodyError, HookError, HookResult};

/// Decoding knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Drop a leading UTF-8 byte-order mark before parsing.
    pub strip_bom: bool,
    /// Treat an empty or whitespace-only payload as JSON `null`.
    pub empty_as_null: bool,
}

/// Memoizes the first successful decode of a payload.
#[derive(Debug, Default)]
pub struct BodyDecoder {
    cached: Option<Value>,
    attempts: usize,
}

impl BodyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(
        &mut self,
        raw: &[u8],
        options: ParseOptions,
        fail_on_error: bool,
    ) -> HookResult<Option<&Value>> {
        if self.cached.is_none() {
            self.attempts += 1;
            match decode(raw, options) {
                Ok(value) => self.cached = Some(value),
                Err(source) => {
                    debug!(error = %source, len = raw.len(), "Payload is not valid JSON");
                    if fail_on_error {
                        return Err(HookError::bad_request(source));
                    }
                    return Ok(None);
                }
            }
        }
        Ok(self.cached.as_ref())
    }

    pub fn cached(&self) -> Option<&Value> {
        self.cached.as_ref()
    }

    /// Number of decode attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

fn decode(raw: &[u8], options: ParseOptions) -> Result<Value, BodyError> {
    let mut text = std::str::from_utf8(raw)?;
    if options.strip_bom {
        text = text.strip_prefix('\u{feff}').unwrap_or(text);
    }
    if options.empty_as_null && text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text)?)
}
