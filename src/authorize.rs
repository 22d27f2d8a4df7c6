//! # Authorization
//!
//! Authorization in the engine is data, not control flow: checking an
//! ability yields an [`AuthorizationResponse`] carrying allowed/denied plus
//! an optional message, and callers decide whether a denial hides a
//! control, shows a tooltip, or sends a notification.
//!
//! The gate itself is an opaque collaborator behind the [`Gate`] trait.
//! Rules come in three shapes: a single ability, an "all of" list that
//! fails closed on the first denial, and an "any of" list that succeeds on
//! the first grant.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::ConfigError;
use crate::record::Record;

/// The result of an ability check: allowed or denied, with an optional
/// user-facing message attached to denials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    /// Whether the ability was granted.
    pub allowed: bool,
    /// An optional message explaining a denial.
    pub message: Option<String>,
}

impl AuthorizationResponse {
    /// A granted response.
    pub fn allow() -> Self {
        AuthorizationResponse {
            allowed: true,
            message: None,
        }
    }

    /// A denied response with no message.
    pub fn deny() -> Self {
        AuthorizationResponse {
            allowed: false,
            message: None,
        }
    }

    /// A denied response carrying a message.
    pub fn deny_with_message(message: impl Into<String>) -> Self {
        AuthorizationResponse {
            allowed: false,
            message: Some(message.into()),
        }
    }

    /// Whether the response is a grant.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// The denial message, treating blank messages as absent.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }

    /// Returns this response with a guaranteed non-blank message.
    ///
    /// A denial without a message is a programming error unless the caller
    /// configured a fallback; the end user must never see a blank denial.
    pub fn with_message(self, fallback: Option<&str>) -> Result<AuthorizationResponse, ConfigError> {
        if self.allowed || self.message().is_some() {
            return Ok(self);
        }
        match fallback {
            Some(message) if !message.trim().is_empty() => {
                Ok(AuthorizationResponse::deny_with_message(message))
            }
            _ => Err(ConfigError::DeniedWithoutMessage),
        }
    }
}

/// An authorization rule attached to an action or component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationRule {
    /// A single ability.
    Single(String),
    /// All abilities must be granted; fails closed on the first denial.
    All(Vec<String>),
    /// At least one ability must be granted.
    Any(Vec<String>),
}

/// The opaque authorization gate.
///
/// The acting subject's arguments are the bound record (or nothing, for
/// model-level checks) plus any explicit extra arguments.
pub trait Gate: Send + Sync {
    /// Checks a single ability.
    fn check(
        &self,
        ability: &str,
        record: Option<&Record>,
        arguments: &[Value],
    ) -> AuthorizationResponse;
}

/// Evaluates a rule against a gate.
///
/// "All" returns the first denial encountered; "any" returns the first
/// grant, or the first denial if nothing was granted.
pub fn authorize(
    gate: &dyn Gate,
    rule: &AuthorizationRule,
    record: Option<&Record>,
    arguments: &[Value],
) -> AuthorizationResponse {
    match rule {
        AuthorizationRule::Single(ability) => gate.check(ability, record, arguments),
        AuthorizationRule::All(abilities) => {
            for ability in abilities {
                let response = gate.check(ability, record, arguments);
                if !response.is_allowed() {
                    return response;
                }
            }
            AuthorizationResponse::allow()
        }
        AuthorizationRule::Any(abilities) => {
            let mut first_denial = None;
            for ability in abilities {
                let response = gate.check(ability, record, arguments);
                if response.is_allowed() {
                    return response;
                }
                first_denial.get_or_insert(response);
            }
            first_denial.unwrap_or_else(AuthorizationResponse::deny)
        }
    }
}

/// A gate that grants every ability. The daemon default.
pub struct AllowAllGate;

impl Gate for AllowAllGate {
    fn check(&self, _: &str, _: Option<&Record>, _: &[Value]) -> AuthorizationResponse {
        AuthorizationResponse::allow()
    }
}

/// A gate backed by a fixed ability map, with a configurable default.
///
/// Useful in tests and in deployments where policy is static.
pub struct MapGate {
    responses: HashMap<String, AuthorizationResponse>,
    default_allow: bool,
}

impl MapGate {
    /// Creates a gate that grants abilities not present in the map.
    pub fn allowing_by_default() -> Self {
        MapGate {
            responses: HashMap::new(),
            default_allow: true,
        }
    }

    /// Creates a gate that denies abilities not present in the map.
    pub fn denying_by_default() -> Self {
        MapGate {
            responses: HashMap::new(),
            default_allow: false,
        }
    }

    /// Sets the response for an ability.
    pub fn set(&mut self, ability: impl Into<String>, response: AuthorizationResponse) {
        self.responses.insert(ability.into(), response);
    }

    /// Builder-style variant of [`MapGate::set`].
    pub fn with(mut self, ability: impl Into<String>, response: AuthorizationResponse) -> Self {
        self.set(ability, response);
        self
    }
}

impl Gate for MapGate {
    fn check(&self, ability: &str, _: Option<&Record>, _: &[Value]) -> AuthorizationResponse {
        match self.responses.get(ability) {
            Some(response) => response.clone(),
            None if self.default_allow => AuthorizationResponse::allow(),
            None => AuthorizationResponse::deny(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_semantics_fail_closed() {
        let gate = MapGate::denying_by_default()
            .with("view", AuthorizationResponse::allow())
            .with("update", AuthorizationResponse::deny_with_message("no"));
        let rule = AuthorizationRule::All(vec!["view".to_string(), "update".to_string()]);

        let response = authorize(&gate, &rule, None, &[]);
        assert!(!response.is_allowed());
        assert_eq!(response.message(), Some("no"));
    }

    #[test]
    fn all_semantics_succeed_when_every_ability_granted() {
        let gate = MapGate::allowing_by_default();
        let rule = AuthorizationRule::All(vec!["view".to_string(), "update".to_string()]);
        assert!(authorize(&gate, &rule, None, &[]).is_allowed());
    }

    #[test]
    fn any_semantics_succeed_on_single_grant() {
        let gate = MapGate::denying_by_default().with("restore", AuthorizationResponse::allow());
        let rule = AuthorizationRule::Any(vec!["delete".to_string(), "restore".to_string()]);
        assert!(authorize(&gate, &rule, None, &[]).is_allowed());
    }

    #[test]
    fn any_semantics_return_first_denial_when_nothing_granted() {
        let gate = MapGate::denying_by_default()
            .with("delete", AuthorizationResponse::deny_with_message("first"))
            .with("restore", AuthorizationResponse::deny_with_message("second"));
        let rule = AuthorizationRule::Any(vec!["delete".to_string(), "restore".to_string()]);

        let response = authorize(&gate, &rule, None, &[]);
        assert!(!response.is_allowed());
        assert_eq!(response.message(), Some("first"));
    }

    #[test]
    fn denial_without_message_is_a_config_error() {
        let response = AuthorizationResponse::deny();
        assert_eq!(
            response.clone().with_message(None),
            Err(ConfigError::DeniedWithoutMessage)
        );
        assert_eq!(
            response.with_message(Some("fallback")).unwrap().message(),
            Some("fallback")
        );
    }

    #[test]
    fn blank_messages_count_as_missing() {
        let response = AuthorizationResponse::deny_with_message("   ");
        assert_eq!(
            response.with_message(None),
            Err(ConfigError::DeniedWithoutMessage)
        );
    }

    #[test]
    fn grants_pass_through_with_message_unchanged() {
        let response = AuthorizationResponse::allow();
        assert!(response.with_message(None).unwrap().is_allowed());
    }
}
