//! Structured stanza errors
//!
//! An error reply carries an XMPP-level error type plus an optional generic
//! XMPP condition and/or a Jingle-specific condition. Both vocabularies are
//! closed enums, so an invalid condition cannot reach the wire.

/// XMPP stanza error type attribute (RFC 6120 §8.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Auth,
    Cancel,
    Continue,
    Modify,
    Wait,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Auth => "auth",
            ErrorType::Cancel => "cancel",
            ErrorType::Continue => "continue",
            ErrorType::Modify => "modify",
            ErrorType::Wait => "wait",
        }
    }
}

/// Generic XMPP error condition (RFC 6120 §8.3.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmppCondition {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    RecipientUnavailable,
    Redirect,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    UndefinedCondition,
    UnexpectedRequest,
}

impl XmppCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            XmppCondition::BadRequest => "bad-request",
            XmppCondition::Conflict => "conflict",
            XmppCondition::FeatureNotImplemented => "feature-not-implemented",
            XmppCondition::Forbidden => "forbidden",
            XmppCondition::Gone => "gone",
            XmppCondition::InternalServerError => "internal-server-error",
            XmppCondition::ItemNotFound => "item-not-found",
            XmppCondition::JidMalformed => "jid-malformed",
            XmppCondition::NotAcceptable => "not-acceptable",
            XmppCondition::NotAllowed => "not-allowed",
            XmppCondition::NotAuthorized => "not-authorized",
            XmppCondition::RecipientUnavailable => "recipient-unavailable",
            XmppCondition::Redirect => "redirect",
            XmppCondition::RemoteServerNotFound => "remote-server-not-found",
            XmppCondition::RemoteServerTimeout => "remote-server-timeout",
            XmppCondition::ResourceConstraint => "resource-constraint",
            XmppCondition::ServiceUnavailable => "service-unavailable",
            XmppCondition::UndefinedCondition => "undefined-condition",
            XmppCondition::UnexpectedRequest => "unexpected-request",
        }
    }
}

/// Jingle-specific error condition (XEP-0166 §10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JingleCondition {
    OutOfOrder,
    SecurityRequired,
    TieBreak,
    UnknownSession,
    UnsupportedInfo,
}

impl JingleCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            JingleCondition::OutOfOrder => "out-of-order",
            JingleCondition::SecurityRequired => "security-required",
            JingleCondition::TieBreak => "tie-break",
            JingleCondition::UnknownSession => "unknown-session",
            JingleCondition::UnsupportedInfo => "unsupported-info",
        }
    }
}

/// A structured protocol error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StanzaError {
    pub error_type: ErrorType,
    pub xmpp: Option<XmppCondition>,
    pub jingle: Option<JingleCondition>,
}

impl StanzaError {
    /// Jingle condition paired with its canonical XMPP condition
    pub const OUT_OF_ORDER: StanzaError = StanzaError {
        error_type: ErrorType::Wait,
        xmpp: Some(XmppCondition::UnexpectedRequest),
        jingle: Some(JingleCondition::OutOfOrder),
    };

    pub const TIE_BREAK: StanzaError = StanzaError {
        error_type: ErrorType::Cancel,
        xmpp: Some(XmppCondition::Conflict),
        jingle: Some(JingleCondition::TieBreak),
    };

    pub const UNKNOWN_SESSION: StanzaError = StanzaError {
        error_type: ErrorType::Cancel,
        xmpp: Some(XmppCondition::ItemNotFound),
        jingle: Some(JingleCondition::UnknownSession),
    };

    pub const UNSUPPORTED_INFO: StanzaError = StanzaError {
        error_type: ErrorType::Modify,
        xmpp: Some(XmppCondition::FeatureNotImplemented),
        jingle: Some(JingleCondition::UnsupportedInfo),
    };

    pub const SECURITY_REQUIRED: StanzaError = StanzaError {
        error_type: ErrorType::Cancel,
        xmpp: Some(XmppCondition::NotAcceptable),
        jingle: Some(JingleCondition::SecurityRequired),
    };

    pub const SERVICE_UNAVAILABLE: StanzaError = StanzaError {
        error_type: ErrorType::Cancel,
        xmpp: Some(XmppCondition::ServiceUnavailable),
        jingle: None,
    };

    pub const FEATURE_NOT_IMPLEMENTED: StanzaError = StanzaError {
        error_type: ErrorType::Cancel,
        xmpp: Some(XmppCondition::FeatureNotImplemented),
        jingle: None,
    };

    pub const BAD_REQUEST: StanzaError = StanzaError {
        error_type: ErrorType::Modify,
        xmpp: Some(XmppCondition::BadRequest),
        jingle: None,
    };

    pub const INTERNAL_SERVER_ERROR: StanzaError = StanzaError {
        error_type: ErrorType::Cancel,
        xmpp: Some(XmppCondition::InternalServerError),
        jingle: None,
    };

    /// Condition name used for logging, Jingle condition preferred
    pub fn condition_name(&self) -> &'static str {
        if let Some(jingle) = self.jingle {
            return jingle.as_str();
        }
        if let Some(xmpp) = self.xmpp {
            return xmpp.as_str();
        }
        "undefined"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_errors_carry_canonical_pairings() {
        assert_eq!(
            StanzaError::UNKNOWN_SESSION.xmpp,
            Some(XmppCondition::ItemNotFound)
        );
        assert_eq!(StanzaError::UNKNOWN_SESSION.error_type, ErrorType::Cancel);
        assert_eq!(
            StanzaError::OUT_OF_ORDER.xmpp,
            Some(XmppCondition::UnexpectedRequest)
        );
        assert_eq!(StanzaError::OUT_OF_ORDER.error_type, ErrorType::Wait);
    }

    #[test]
    fn test_condition_name_prefers_jingle() {
        assert_eq!(StanzaError::UNKNOWN_SESSION.condition_name(), "unknown-session");
        assert_eq!(
            StanzaError::SERVICE_UNAVAILABLE.condition_name(),
            "service-unavailable"
        );
    }
}
