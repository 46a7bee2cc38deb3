//! Console protocol codec
//!
//! Encodes requests for the instrument's text console and decodes its replies.
//! Every reply to a request arrives as three `\r\n` separated segments:
//!
//! ```text
//! BRI:AWA 100\r\nOK\r\nscpi>
//! ^ echo       ^ status  ^ prompt
//! ```
//!
//! The echo repeats the keyword followed by the value, optionally followed by a
//! unit (`FAN:MSP 4170 rpm`) and sometimes with a stray quote glued to the
//! value (`PHA:CLO:1 +020'`). Nothing here performs I/O.

use crate::error::{BridgeError, BridgeResult};
use crate::schema::{TypedValue, ValueType};
use std::borrow::Cow;
use std::fmt;

/// Line terminator used in both directions.
pub const TERMINATOR: &str = "\r\n";
/// Status marker of an acknowledged request.
pub const OK_MARKER: &str = "OK";
/// Token that switches the instrument console into command mode.
pub const CONSOLE_TOKEN: &str = "scpi";
/// Identity query keyword (sent as `*IDN?`).
pub const IDENTITY_KEYWORD: &str = "*IDN";
/// Substring the identity reply must contain.
pub const PRODUCT_MARKER: &str = "BBFE";
/// Reset command.
pub const RESET_COMMAND: &str = "*RST";

const QUOTES: [char; 2] = ['\'', '"'];

/// One terminated request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine(Vec<u8>);

impl RequestLine {
    /// Raw bytes including the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RequestLine {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

/// Raw bytes returned by one receive call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseFrame(Vec<u8>);

impl ResponseFrame {
    /// Wrap received bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy text view of the frame. The console is ASCII.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// True when the `OK` marker appears anywhere in the frame.
    ///
    /// Used for writes and commands, whose echo is not inspected. Some
    /// firmware answers with a bare `OK\r\n<prompt>` and no echo.
    pub fn is_acknowledged(&self) -> bool {
        self.contains(OK_MARKER)
    }

    /// True when the frame contains `marker` anywhere.
    pub fn contains(&self, marker: &str) -> bool {
        self.text().contains(marker)
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.text())
    }
}

/// Decoded read reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    /// Value token with stray quotes removed.
    pub value_token: String,
    /// Whether the status segment carried `OK`.
    pub status_ok: bool,
    /// Unit token following the value, if the instrument sent one.
    pub unit: Option<String>,
}

/// `"<keyword>?\r\n"`
pub fn encode_read(keyword: &str) -> RequestLine {
    RequestLine(format!("{keyword}?{TERMINATOR}").into_bytes())
}

/// `"<keyword> <value_text>\r\n"`
pub fn encode_write(keyword: &str, value_text: &str) -> RequestLine {
    RequestLine(format!("{keyword} {value_text}{TERMINATOR}").into_bytes())
}

/// `"<command>\r\n"`, for bare commands such as `*RST` or the console token.
pub fn encode_command(command: &str) -> RequestLine {
    RequestLine(format!("{command}{TERMINATOR}").into_bytes())
}

/// Decode a read reply for `expected_keyword`.
///
/// # Errors
///
/// - `MalformedResponse` when the frame does not split into exactly three
///   segments or the echo carries no value token.
/// - `UnexpectedEcho` when the echo does not start with the keyword (a
///   trailing `?` on the echoed keyword is accepted).
pub fn decode_response(raw: &[u8], expected_keyword: &str) -> BridgeResult<DecodedResponse> {
    let text = String::from_utf8_lossy(raw);
    let segments: Vec<&str> = text.split(TERMINATOR).collect();
    let [echo, status, _trailer] = segments.as_slice() else {
        return Err(BridgeError::MalformedResponse(text.to_string()));
    };

    let mut tokens = echo.split_whitespace();
    let echoed = tokens.next().unwrap_or_default();
    if echoed != expected_keyword && echoed.strip_suffix('?') != Some(expected_keyword) {
        return Err(BridgeError::UnexpectedEcho {
            expected: expected_keyword.to_string(),
            found: echoed.to_string(),
        });
    }

    let value_token = tokens
        .next()
        .map(|token| token.trim_matches(QUOTES.as_slice()).to_string())
        .ok_or_else(|| BridgeError::MalformedResponse(text.to_string()))?;
    let unit = tokens.next().map(str::to_string);

    Ok(DecodedResponse {
        value_token,
        status_ok: status.contains(OK_MARKER),
        unit,
    })
}

/// Convert a value token into a typed value.
///
/// Numeric tokens lose any quote and trailing unit suffix (`25.5C`, `80%`)
/// before parsing. String tokens are returned unchanged.
pub fn coerce(value_token: &str, value_type: ValueType) -> BridgeResult<TypedValue> {
    let numeric = || {
        value_token
            .trim_matches(QUOTES.as_slice())
            .trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '%')
    };
    let failed = || BridgeError::ValueCoercion {
        token: value_token.to_string(),
        value_type,
    };

    match value_type {
        ValueType::Integer => numeric().parse().map(TypedValue::Integer).map_err(|_| failed()),
        ValueType::Float => numeric().parse().map(TypedValue::Float).map_err(|_| failed()),
        ValueType::String => Ok(TypedValue::String(value_token.to_string())),
    }
}
