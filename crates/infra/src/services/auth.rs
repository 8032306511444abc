//! Login with password + one-time code, and password change.
//!
//! ```text
//! Unauthenticated --password ok--> PasswordVerified --code sent--> OtpPending
//!        |                                                             |
//!        +--3 failures--> LockedOut (10 min)          code ok --> Authenticated
//! ```

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use malvader_auth::{
    ActiveOtp, Actor, AuditAction, AuditEntry, FailureWindow, LoginState, NationalId, OtpVerdict,
    Principal, Role, SessionClaims, check_strength, generate_code, hash_password,
    verify_login_code, verify_password,
};
use malvader_core::{DomainError, PrincipalId};

use super::{BankService, finish};
use crate::store::{BankStore, UnitOfWork};

/// Returned once the password was accepted and a code was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub principal_id: PrincipalId,
    pub expires_at: DateTime<Utc>,
}

impl LoginChallenge {
    pub fn state(&self) -> LoginState {
        LoginState::OtpPending {
            principal_id: self.principal_id,
            expires_at: self.expires_at,
        }
    }
}

/// An authenticated session, ready to be signed into a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub actor: Actor,
    pub claims: SessionClaims,
}

impl Session {
    pub fn state(&self) -> LoginState {
        LoginState::Authenticated {
            principal_id: self.actor.principal_id,
            password_change_required: self.claims.password_change_required,
        }
    }
}

fn invalid_credentials() -> DomainError {
    DomainError::InvalidCredentials {
        final_attempt: false,
    }
}

impl<S: BankStore> BankService<S> {
    /// First factor. Unknown identities and wrong passwords fail identically.
    #[instrument(skip_all, fields(role = %role))]
    pub async fn login(
        &self,
        role: Role,
        national_id: &str,
        password: &str,
    ) -> Result<LoginChallenge, DomainError> {
        let national_id = NationalId::parse(national_id).map_err(|_| invalid_credentials())?;
        let now = self.now();

        let mut tx = self.begin().await?;
        let principal = match self.check_password(&mut tx, role, &national_id, password, now).await {
            Ok(principal) => principal,
            Err(PasswordCheck::Rejected(err)) => return finish(tx, "login", Err(err)).await,
            Err(PasswordCheck::Recorded(err)) => {
                // The failure audit must survive the error.
                finish(tx, "login", Ok(())).await?;
                warn!(error = %err, "login rejected");
                return Err(err);
            }
        };
        finish(tx, "login", Ok(())).await?;

        let code = generate_code(&mut rand::thread_rng());
        self.notifier
            .send(&principal.email, &principal.name, &code)
            .await
            .map_err(|e| {
                warn!(principal_id = %principal.id, error = %e, "one-time code delivery failed");
                DomainError::from(e)
            })?;

        let otp = ActiveOtp::new(code, now, self.auth_policy.login_otp_ttl());
        let expires_at = otp.expires_at;
        let mut tx = self.begin().await?;
        let result = async {
            let mut principal = tx
                .principal(principal.id)
                .await?
                .ok_or(DomainError::not_found("principal"))?;
            principal.issue_otp(otp);
            tx.update_principal(&principal).await?;
            Ok::<_, DomainError>(())
        }
        .await;
        finish(tx, "login", result).await?;

        info!(principal_id = %principal.id, "password accepted, code dispatched");
        Ok(LoginChallenge {
            principal_id: principal.id,
            expires_at,
        })
    }

    async fn check_password(
        &self,
        tx: &mut S::Tx,
        role: Role,
        national_id: &NationalId,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, PasswordCheck> {
        let principal = tx
            .principal_by_national_id(national_id)
            .await
            .map_err(|e| PasswordCheck::Rejected(e.into()))?
            .filter(|p| p.role == role)
            .ok_or(PasswordCheck::Rejected(invalid_credentials()))?;

        let failures = tx
            .recent_login_failures(principal.id, self.auth_policy.max_failed_logins as usize)
            .await
            .map_err(|e| PasswordCheck::Rejected(e.into()))?;
        let window = FailureWindow::new(failures, &self.auth_policy);
        window
            .check(now, &self.auth_policy)
            .map_err(PasswordCheck::Rejected)?;

        let matches = verify_password(password, &principal.password_hash)
            .map_err(|e| PasswordCheck::Rejected(e.into()))?;
        if !matches {
            let attempt = window.next_attempt();
            let entry = AuditEntry::new(
                principal.id,
                AuditAction::LoginFailure,
                now,
                format!("failed login attempt {attempt}"),
            );
            tx.append_audit(&entry)
                .await
                .map_err(|e| PasswordCheck::Rejected(e.into()))?;
            return Err(PasswordCheck::Recorded(DomainError::InvalidCredentials {
                final_attempt: window.next_is_final(&self.auth_policy),
            }));
        }

        let entry = AuditEntry::new(principal.id, AuditAction::LoginSuccess, now, "password accepted");
        tx.append_audit(&entry)
            .await
            .map_err(|e| PasswordCheck::Rejected(e.into()))?;
        Ok(principal)
    }

    /// Second factor. A correct, unexpired code yields a session.
    #[instrument(skip_all, fields(principal_id = %principal_id))]
    pub async fn verify_otp(
        &self,
        principal_id: PrincipalId,
        code: &str,
    ) -> Result<Session, DomainError> {
        let now = self.now();
        let mut tx = self.begin().await?;

        let mut principal = match tx.principal(principal_id).await {
            Ok(Some(principal)) => principal,
            Ok(None) => return finish(tx, "verify_otp", Err(DomainError::InvalidOtp)).await,
            Err(e) => return finish(tx, "verify_otp", Err(e.into())).await,
        };

        let verdict = verify_login_code(&mut principal, code, now, &self.auth_policy);
        let result = match verdict {
            OtpVerdict::Accepted => self.open_session(&mut tx, &principal, now).await,
            OtpVerdict::Rejected { attempts } => {
                let detail = format!("wrong code, attempt {attempts}");
                self.record_otp_failure(&mut tx, &principal, now, detail).await
            }
            OtpVerdict::Exhausted => {
                let detail = "code discarded, login required".to_string();
                self.record_otp_failure(&mut tx, &principal, now, detail).await
            }
        };

        match result {
            Ok(Some(session)) => {
                finish(tx, "verify_otp", Ok(())).await?;
                info!(password_change_required = session.claims.password_change_required, "session opened");
                Ok(session)
            }
            // Failed attempts are committed before the error surfaces.
            Ok(None) => {
                finish(tx, "verify_otp", Ok(())).await?;
                warn!("one-time code rejected");
                Err(DomainError::InvalidOtp)
            }
            Err(err) => finish(tx, "verify_otp", Err(err)).await,
        }
    }

    async fn open_session(
        &self,
        tx: &mut S::Tx,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, DomainError> {
        tx.update_principal(principal).await?;
        let actor = resolve_actor(tx, principal).await?;
        let claims = SessionClaims::for_actor(
            &actor,
            principal.provisional_password,
            now,
            now + self.auth_policy.session_ttl(),
        );
        Ok(Some(Session { actor, claims }))
    }

    async fn record_otp_failure(
        &self,
        tx: &mut S::Tx,
        principal: &Principal,
        now: DateTime<Utc>,
        detail: String,
    ) -> Result<Option<Session>, DomainError> {
        tx.update_principal(principal).await?;
        tx.append_audit(&AuditEntry::new(principal.id, AuditAction::OtpFailure, now, detail))
            .await?;
        Ok(None)
    }

    /// Replace the caller's password. Clears the provisional flag and
    /// returns a fresh session without the password-change gate.
    #[instrument(skip_all, fields(principal_id = %actor.principal_id))]
    pub async fn change_password(
        &self,
        actor: &Actor,
        current: &str,
        new_password: &str,
    ) -> Result<Session, DomainError> {
        check_strength(new_password, self.auth_policy.min_password_len)?;
        let now = self.now();
        let mut tx = self.begin().await?;
        let result = async {
            let mut principal = tx
                .principal(actor.principal_id)
                .await?
                .ok_or(DomainError::not_found("principal"))?;
            if !verify_password(current, &principal.password_hash)? {
                return Err(invalid_credentials());
            }
            principal.password_hash = hash_password(new_password)?;
            principal.provisional_password = false;
            tx.update_principal(&principal).await?;
            tx.append_audit(&AuditEntry::new(
                principal.id,
                AuditAction::PasswordChanged,
                now,
                "password changed",
            ))
            .await?;

            let claims =
                SessionClaims::for_actor(actor, false, now, now + self.auth_policy.session_ttl());
            Ok::<_, DomainError>(Session {
                actor: actor.clone(),
                claims,
            })
        }
        .await;
        finish(tx, "change_password", result).await
    }
}

enum PasswordCheck {
    /// Nothing worth keeping was staged.
    Rejected(DomainError),
    /// A failure audit was staged and must be committed.
    Recorded(DomainError),
}

/// Build the authorization actor for a principal from its role extension.
pub(crate) async fn resolve_actor<U: UnitOfWork>(
    tx: &mut U,
    principal: &Principal,
) -> Result<Actor, DomainError> {
    match principal.role {
        Role::Customer => {
            let customer = tx
                .customer_by_principal(principal.id)
                .await?
                .ok_or_else(|| DomainError::consistency(format!("principal {} has no customer record", principal.id)))?;
            Ok(Actor::customer(principal.id, customer.id))
        }
        Role::Employee => {
            let employee = tx
                .employee_by_principal(principal.id)
                .await?
                .ok_or_else(|| DomainError::consistency(format!("principal {} has no employee record", principal.id)))?;
            Ok(Actor::employee(principal.id, employee.id, employee.rank))
        }
    }
}
