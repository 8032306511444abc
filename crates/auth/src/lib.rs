//! `malvader-auth`: identity, step-up authentication and authorization.
//!
//! Pure domain logic: no HTTP, no storage. The infra services load principals
//! and audit windows, call into this crate, and persist the outcome.

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod lockout;
pub mod login;
pub mod otp;
pub mod password;
pub mod pending;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod user;

pub use audit::{AuditAction, AuditEntry};
pub use authorize::{Actor, AuthzError, authorize, ensure_owner};
pub use claims::{Hs256JwtValidator, JwtValidator, SessionClaims, TokenValidationError, validate_claims};
pub use lockout::FailureWindow;
pub use login::LoginState;
pub use otp::{ActiveOtp, OtpVerdict, generate_code, verify_login_code};
pub use password::{PasswordError, check_strength, generate_provisional, hash_password, verify_password};
pub use pending::{PendingKind, PendingOperation};
pub use permissions::Permission;
pub use policy::AuthPolicy;
pub use principal::{IdentityInput, NationalId, Principal, Role, ValidatedIdentity};
pub use roles::EmployeeRank;
pub use user::{Customer, DEFAULT_CREDIT_SCORE, Employee};
