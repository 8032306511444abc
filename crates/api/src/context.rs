use malvader_auth::{Actor, SessionClaims};

/// Authenticated caller for a request.
///
/// Built from verified token claims by the auth middleware and present on
/// every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    actor: Actor,
    password_change_required: bool,
}

impl SessionContext {
    pub fn new(actor: Actor, password_change_required: bool) -> Self {
        Self {
            actor,
            password_change_required,
        }
    }

    pub fn from_claims(actor: Actor, claims: &SessionClaims) -> Self {
        Self::new(actor, claims.password_change_required)
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn password_change_required(&self) -> bool {
        self.password_change_required
    }
}
