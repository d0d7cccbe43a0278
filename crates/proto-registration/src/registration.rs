//! The triangular registration protocol: ASCII UDP datagrams, no length
//! prefix, no trailing newline, exactly two verbs.

use crate::ports::CallId;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMessage {
    Register(CallId),
    Bye(CallId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationParseError {
    #[error("unrecognized verb in datagram {0:?}")]
    UnknownVerb(String),
    #[error("non-decimal call id {0:?}")]
    NonDecimalCallId(String),
}

impl RegistrationMessage {
    /// Parse a raw UDP datagram. Whitespace around the call id is
    /// stripped; non-decimal content is rejected with an error, never a
    /// panic.
    pub fn parse(datagram: &[u8]) -> Result<Self, RegistrationParseError> {
        let text = String::from_utf8_lossy(datagram);
        let text = text.trim();

        if let Some(rest) = text.strip_prefix("REGISTER:") {
            Ok(RegistrationMessage::Register(parse_call_id(rest)?))
        } else if let Some(rest) = text.strip_prefix("BYE:") {
            Ok(RegistrationMessage::Bye(parse_call_id(rest)?))
        } else {
            Err(RegistrationParseError::UnknownVerb(text.to_string()))
        }
    }

    pub fn encode(self) -> String {
        match self {
            RegistrationMessage::Register(id) => format!("REGISTER:{id}"),
            RegistrationMessage::Bye(id) => format!("BYE:{id}"),
        }
    }

    pub fn call_id(self) -> CallId {
        match self {
            RegistrationMessage::Register(id) | RegistrationMessage::Bye(id) => id,
        }
    }
}

fn parse_call_id(raw: &str) -> Result<CallId, RegistrationParseError> {
    raw.trim()
        .parse::<u32>()
        .map(CallId::new)
        .map_err(|_| RegistrationParseError::NonDecimalCallId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register() {
        assert_eq!(
            RegistrationMessage::parse(b"REGISTER:7").unwrap(),
            RegistrationMessage::Register(CallId::new(7))
        );
    }

    #[test]
    fn parses_bye() {
        assert_eq!(
            RegistrationMessage::parse(b"BYE:7").unwrap(),
            RegistrationMessage::Bye(CallId::new(7))
        );
    }

    #[test]
    fn strips_surrounding_whitespace() {
        assert_eq!(
            RegistrationMessage::parse(b"  REGISTER: 7  ").unwrap(),
            RegistrationMessage::Register(CallId::new(7))
        );
    }

    #[test]
    fn rejects_non_decimal_id_without_panicking() {
        let err = RegistrationMessage::parse(b"REGISTER:abc").unwrap_err();
        assert!(matches!(err, RegistrationParseError::NonDecimalCallId(_)));
    }

    #[test]
    fn rejects_unknown_verb() {
        let err = RegistrationMessage::parse(b"HELLO:7").unwrap_err();
        assert!(matches!(err, RegistrationParseError::UnknownVerb(_)));
    }

    #[test]
    fn encode_round_trips_through_parse() {
        let msg = RegistrationMessage::Register(CallId::new(12));
        assert_eq!(RegistrationMessage::parse(msg.encode().as_bytes()), Ok(msg));
    }
}
