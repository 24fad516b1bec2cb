//! Normalized user context
//!
//! [`UserContext`] is what every successful validation produces, regardless of
//! which issuer signed the token. It carries only canonical permissions; the
//! issuer's native vocabulary never leaves the verifier.

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionSet;

/// Display-only profile attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayAttributes {
    /// Full name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Preferred username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl DisplayAttributes {
    /// Best label for humans: name, then username, then email.
    pub fn label(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.email.as_deref())
    }
}

/// Authenticated identity, normalized across issuers.
///
/// # Example
///
/// ```rust
/// use issuergate_auth::UserContext;
///
/// let ctx = UserContext::builder()
///     .subject("u1")
///     .issuer("A")
///     .permission("app.user.read")
///     .expires_at(1_700_003_600)
///     .build()
///     .unwrap();
///
/// assert!(ctx.has_permission("app.user.read"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Subject identifier as asserted by the issuer
    pub subject: String,

    /// Issuer that authenticated the subject
    pub issuer: String,

    /// Display attributes
    #[serde(default)]
    pub display: DisplayAttributes,

    /// Canonical permissions
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Unix time after which the issuer's assertion no longer holds
    pub expires_at: u64,

    /// Unix time of validation
    pub authenticated_at: u64,
}

impl UserContext {
    /// Create a builder
    pub fn builder() -> UserContextBuilder {
        UserContextBuilder::default()
    }

    /// Check for a canonical permission.
    ///
    /// The canonical wildcard grants everything under its prefix.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.grants(permission)
    }

    /// Check if the issuer's assertion has lapsed at `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Builder for [`UserContext`]
#[derive(Debug, Default)]
pub struct UserContextBuilder {
    subject: Option<String>,
    issuer: Option<String>,
    display: DisplayAttributes,
    permissions: PermissionSet,
    expires_at: Option<u64>,
    authenticated_at: u64,
}

impl UserContextBuilder {
    /// Set subject (required)
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set issuer (required)
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set display attributes
    pub fn display(mut self, display: DisplayAttributes) -> Self {
        self.display = display;
        self
    }

    /// Replace the permission set
    pub fn permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    /// Add one canonical permission
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// Set expiry (required)
    pub fn expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set validation time
    pub fn authenticated_at(mut self, authenticated_at: u64) -> Self {
        self.authenticated_at = authenticated_at;
        self
    }

    /// Build the context
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::MissingField`] if subject, issuer or expiry is
    /// unset, or subject/issuer is empty.
    pub fn build(self) -> Result<UserContext, ContextError> {
        let subject = self
            .subject
            .filter(|s| !s.is_empty())
            .ok_or(ContextError::MissingField("subject"))?;
        let issuer = self
            .issuer
            .filter(|s| !s.is_empty())
            .ok_or(ContextError::MissingField("issuer"))?;
        let expires_at = self
            .expires_at
            .ok_or(ContextError::MissingField("expires_at"))?;

        Ok(UserContext {
            subject,
            issuer,
            display: self.display,
            permissions: self.permissions,
            expires_at,
            authenticated_at: self.authenticated_at,
        })
    }
}

/// Error building a [`UserContext`]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_fields() {
        assert_eq!(
            UserContext::builder().issuer("A").expires_at(1).build(),
            Err(ContextError::MissingField("subject"))
        );
        assert_eq!(
            UserContext::builder()
                .subject("u1")
                .issuer("")
                .expires_at(1)
                .build(),
            Err(ContextError::MissingField("issuer"))
        );
        assert_eq!(
            UserContext::builder().subject("u1").issuer("A").build(),
            Err(ContextError::MissingField("expires_at"))
        );
    }

    #[test]
    fn test_serde_shape() {
        let ctx = UserContext::builder()
            .subject("u1")
            .issuer("A")
            .permission("app.user.read")
            .expires_at(200)
            .authenticated_at(100)
            .build()
            .unwrap();

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["permissions"], serde_json::json!(["app.user.read"]));
        assert_eq!(json["display"], serde_json::json!({}));

        let back: UserContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_expiry_boundary() {
        let ctx = UserContext::builder()
            .subject("u1")
            .issuer("A")
            .expires_at(200)
            .build()
            .unwrap();
        assert!(!ctx.is_expired_at(199));
        assert!(ctx.is_expired_at(200));
    }

    #[test]
    fn test_display_label_precedence() {
        let display = DisplayAttributes {
            name: None,
            email: Some("u1@example.com".into()),
            username: Some("u1".into()),
        };
        assert_eq!(display.label(), Some("u1"));
        assert_eq!(DisplayAttributes::default().label(), None);
    }
}
