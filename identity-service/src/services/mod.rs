//! Services layer for identity-service.
//!
//! Token issuance and validation, grant handling, sign-up, MFA step-up,
//! passkey ceremonies and the persistence seams they share.

mod challenge;
pub mod claims;
mod database;
pub mod error;
mod grant;
pub mod jwt;
mod memory;
mod mfa;
mod notifier;
mod passkey;
mod password_reset;
mod permissions;
mod registration;
pub mod settings;
pub mod store;
mod token;

pub use challenge::ChallengeSessionBroker;
pub use claims::{
    Claims, MfaClaims, OpenIdClaims, PasswordResetClaims, SubjectType, TokenClaims, TokenType,
    OPENID_SCOPE,
};
pub use database::Database;
pub use error::{CredentialKind, ServiceError};
pub use grant::{GrantService, GrantType};
pub use memory::MemoryStore;
pub use mfa::{MfaService, StepUpState, TotpEnrollment};
pub use notifier::{LogNotifier, MockNotifier, Notifier, PasswordResetMessage};
pub use passkey::{CeremonyState, PasskeyService};
pub use password_reset::PasswordResetService;
pub use permissions::PermissionResolver;
pub use registration::RegistrationService;
pub use settings::{Settings, SettingsService};
pub use store::IdentityStore;
pub use token::{TokenGrant, TokenResponse, TokenService};
