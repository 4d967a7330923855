//! EIP-4361 "Sign-In with Ethereum" message parsing and rendering.
//!
//! ```text
//! [scheme://]{domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! [{statement}]
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! [Expiration Time: {expiration_time}]
//! [Not Before: {not_before}]
//! [Request ID: {request_id}]
//! [Resources:
//! - {resource}...]
//! ```
//!
//! Signatures are always checked against the raw text the wallet signed, so
//! rendering is only used to build messages on the client side.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

use crate::auth::verify::parse_address;

const PREAMBLE: &str = " wants you to sign in with your Ethereum account:";

/// Only version defined by EIP-4361.
pub const SIWE_VERSION: &str = "1";

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SiweError {
    #[error("missing header line")]
    MissingHeader,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid {0}: {1}")]
    InvalidField(&'static str, String),

    #[error("unexpected line: {0}")]
    UnexpectedLine(String),
}

/// A parsed sign-in message.
#[derive(Debug, Clone, PartialEq)]
pub struct SiweMessage {
    pub scheme: Option<String>,
    pub domain: String,
    pub address: String,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// Minimal message with the fields every sign-in needs.
    pub fn new(
        domain: &str,
        address: &str,
        uri: &str,
        chain_id: u64,
        nonce: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        SiweMessage {
            scheme: None,
            domain: domain.to_string(),
            address: address.to_string(),
            statement: None,
            uri: uri.to_string(),
            version: SIWE_VERSION.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at,
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    /// Whether `now` falls inside the message's own validity window.
    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(expiration) = self.expiration_time {
            if now >= expiration {
                return false;
            }
        }
        if let Some(not_before) = self.not_before {
            if now < not_before {
                return false;
            }
        }
        true
    }
}

/// EIP-4361 nonces are at least one alphanumeric character.
pub fn is_valid_nonce(nonce: &str) -> bool {
    !nonce.is_empty() && nonce.chars().all(|c| c.is_ascii_alphanumeric())
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, SiweError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SiweError::InvalidField(field, e.to_string()))
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Cursor over message lines that consumes `Tag: value` fields in order.
struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    fn optional(&mut self, tag: &str) -> Option<&'a str> {
        let value = self.peek()?.strip_prefix(tag)?.strip_prefix(": ")?;
        self.pos += 1;
        Some(value)
    }

    fn required(&mut self, tag: &'static str) -> Result<&'a str, SiweError> {
        self.optional(tag).ok_or(SiweError::MissingField(tag))
    }

    fn expect_blank(&mut self) -> Result<(), SiweError> {
        match self.next_line() {
            Some("") => Ok(()),
            Some(other) => Err(SiweError::UnexpectedLine(other.to_string())),
            None => Err(SiweError::MissingField("URI")),
        }
    }
}

impl FromStr for SiweMessage {
    type Err = SiweError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = Lines {
            lines: s.split('\n').map(|l| l.trim_end_matches('\r')).collect(),
            pos: 0,
        };

        // Header: [scheme://]domain wants you to sign in ...
        let authority = lines
            .next_line()
            .and_then(|l| l.strip_suffix(PREAMBLE))
            .ok_or(SiweError::MissingHeader)?;
        let (scheme, domain) = match authority.split_once("://") {
            Some((scheme, domain)) => (Some(scheme.to_string()), domain),
            None => (None, authority),
        };
        if domain.is_empty() || domain.chars().any(char::is_whitespace) {
            return Err(SiweError::InvalidField("domain", domain.to_string()));
        }

        let address = lines
            .next_line()
            .ok_or(SiweError::MissingField("address"))?;
        parse_address(address).map_err(|e| SiweError::InvalidField("address", e.to_string()))?;

        lines.expect_blank()?;

        // Statement is optional; without one the blank line still follows
        let mut statement = None;
        if !lines.peek().is_some_and(|l| l.starts_with("URI: ")) {
            match lines.next_line() {
                Some("") => {}
                Some(line) => {
                    statement = Some(line.to_string());
                    lines.expect_blank()?;
                }
                None => return Err(SiweError::MissingField("URI")),
            }
        }

        let uri = lines.required("URI")?;
        if uri.is_empty() || !uri.contains(':') {
            return Err(SiweError::InvalidField("URI", uri.to_string()));
        }

        let version = lines.required("Version")?;
        if version != SIWE_VERSION {
            return Err(SiweError::InvalidField("Version", version.to_string()));
        }

        let chain_id = lines.required("Chain ID")?;
        let chain_id = chain_id
            .parse::<u64>()
            .map_err(|e| SiweError::InvalidField("Chain ID", e.to_string()))?;

        let nonce = lines.required("Nonce")?;
        if !is_valid_nonce(nonce) {
            return Err(SiweError::InvalidField("Nonce", nonce.to_string()));
        }

        let issued_at = parse_timestamp("Issued At", lines.required("Issued At")?)?;
        let expiration_time = lines
            .optional("Expiration Time")
            .map(|v| parse_timestamp("Expiration Time", v))
            .transpose()?;
        let not_before = lines
            .optional("Not Before")
            .map(|v| parse_timestamp("Not Before", v))
            .transpose()?;
        let request_id = lines.optional("Request ID").map(str::to_string);

        let mut resources = Vec::new();
        if lines.peek() == Some("Resources:") {
            lines.pos += 1;
            while let Some(resource) = lines.peek().and_then(|l| l.strip_prefix("- ")) {
                resources.push(resource.to_string());
                lines.pos += 1;
            }
        }

        // Only trailing blank lines may follow
        while let Some(line) = lines.next_line() {
            if !line.is_empty() {
                return Err(SiweError::UnexpectedLine(line.to_string()));
            }
        }

        Ok(SiweMessage {
            scheme,
            domain: domain.to_string(),
            address: address.to_string(),
            statement,
            uri: uri.to_string(),
            version: version.to_string(),
            chain_id,
            nonce: nonce.to_string(),
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        writeln!(f, "{}{}", self.domain, PREAMBLE)?;
        writeln!(f, "{}", self.address)?;
        writeln!(f)?;
        if let Some(statement) = &self.statement {
            writeln!(f, "{}", statement)?;
        }
        writeln!(f)?;
        writeln!(f, "URI: {}", self.uri)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Chain ID: {}", self.chain_id)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(f, "Issued At: {}", format_timestamp(&self.issued_at))?;
        if let Some(t) = &self.expiration_time {
            write!(f, "\nExpiration Time: {}", format_timestamp(t))?;
        }
        if let Some(t) = &self.not_before {
            write!(f, "\nNot Before: {}", format_timestamp(t))?;
        }
        if let Some(id) = &self.request_id {
            write!(f, "\nRequest ID: {}", id)?;
        }
        if !self.resources.is_empty() {
            write!(f, "\nResources:")?;
            for resource in &self.resources {
                write!(f, "\n- {}", resource)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn sample() -> String {
        format!(
            "outfitly.app wants you to sign in with your Ethereum account:\n\
             {ADDRESS}\n\
             \n\
             Sign in to Outfitly\n\
             \n\
             URI: https://outfitly.app\n\
             Version: 1\n\
             Chain ID: 1\n\
             Nonce: 32891756\n\
             Issued At: 2024-05-01T16:25:24Z\n\
             Expiration Time: 2024-05-01T16:35:24Z\n\
             Resources:\n\
             - https://outfitly.app/terms\n\
             - ipfs://bafybeiemxf5abjwjbikoz4mc3a3dla6ual3jsgpdr4cjr3oz3evfyavhwq"
        )
    }

    #[test]
    fn test_parse_full_message() {
        let msg: SiweMessage = sample().parse().unwrap();
        assert_eq!(msg.scheme, None);
        assert_eq!(msg.domain, "outfitly.app");
        assert_eq!(msg.address, ADDRESS);
        assert_eq!(msg.statement.as_deref(), Some("Sign in to Outfitly"));
        assert_eq!(msg.uri, "https://outfitly.app");
        assert_eq!(msg.chain_id, 1);
        assert_eq!(msg.nonce, "32891756");
        assert_eq!(
            msg.issued_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 16, 25, 24).unwrap()
        );
        assert!(msg.expiration_time.is_some());
        assert_eq!(msg.not_before, None);
        assert_eq!(msg.resources.len(), 2);
    }

    #[test]
    fn test_parse_without_statement() {
        let text = format!(
            "https://outfitly.app wants you to sign in with your Ethereum account:\n\
             {ADDRESS}\n\
             \n\
             \n\
             URI: https://outfitly.app/login\n\
             Version: 1\n\
             Chain ID: 137\n\
             Nonce: abc123\n\
             Issued At: 2024-05-01T16:25:24.000Z"
        );
        let msg: SiweMessage = text.parse().unwrap();
        assert_eq!(msg.scheme.as_deref(), Some("https"));
        assert_eq!(msg.domain, "outfitly.app");
        assert_eq!(msg.statement, None);
        assert_eq!(msg.chain_id, 137);
        assert_eq!(msg.nonce, "abc123");
    }

    #[test]
    fn test_display_parses_back() {
        let mut msg = SiweMessage::new(
            "outfitly.app",
            ADDRESS,
            "https://outfitly.app",
            1,
            "0f3a9c",
            Utc.with_ymd_and_hms(2024, 5, 1, 16, 25, 24).unwrap(),
        );
        msg.statement = Some("Sign in to Outfitly".to_string());
        msg.request_id = Some("req-1".to_string());
        msg.resources = vec!["https://outfitly.app/terms".to_string()];

        let parsed: SiweMessage = msg.to_string().parse().unwrap();
        assert_eq!(parsed, msg);

        // Same holds without a statement
        msg.statement = None;
        let parsed: SiweMessage = msg.to_string().parse().unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_missing_header() {
        let result = "hello\nworld".parse::<SiweMessage>();
        assert_eq!(result.unwrap_err(), SiweError::MissingHeader);
    }

    #[test]
    fn test_missing_nonce() {
        let text = sample().replace("Nonce: 32891756\n", "");
        let result = text.parse::<SiweMessage>();
        assert_eq!(result.unwrap_err(), SiweError::MissingField("Nonce"));
    }

    #[test]
    fn test_invalid_nonce_characters() {
        let text = sample().replace("Nonce: 32891756", "Nonce: abc-123");
        let result = text.parse::<SiweMessage>();
        assert!(matches!(
            result.unwrap_err(),
            SiweError::InvalidField("Nonce", _)
        ));
    }

    #[test]
    fn test_invalid_address_checksum() {
        let text = sample().replace(ADDRESS, "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let result = text.parse::<SiweMessage>();
        assert!(matches!(
            result.unwrap_err(),
            SiweError::InvalidField("address", _)
        ));
    }

    #[test]
    fn test_invalid_version() {
        let text = sample().replace("Version: 1", "Version: 2");
        assert!(matches!(
            text.parse::<SiweMessage>().unwrap_err(),
            SiweError::InvalidField("Version", _)
        ));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let text = format!("{}\nExtra: field", sample());
        assert!(matches!(
            text.parse::<SiweMessage>().unwrap_err(),
            SiweError::UnexpectedLine(_)
        ));
    }

    #[test]
    fn test_valid_at_window() {
        let mut msg: SiweMessage = sample().parse().unwrap();
        let before_expiry = Utc.with_ymd_and_hms(2024, 5, 1, 16, 30, 0).unwrap();
        let after_expiry = Utc.with_ymd_and_hms(2024, 5, 1, 16, 40, 0).unwrap();
        assert!(msg.valid_at(before_expiry));
        assert!(!msg.valid_at(after_expiry));

        msg.not_before = Some(Utc.with_ymd_and_hms(2024, 5, 1, 16, 31, 0).unwrap());
        assert!(!msg.valid_at(before_expiry));
    }
}
