pub mod application;
pub mod mfa;
pub mod passkey;
pub mod permission;
pub mod service_account;
pub mod subject;
pub mod tenant;
pub mod user;

pub use application::Application;
pub use mfa::{MfaKind, MfaRecord, TotpFactor};
pub use passkey::StoredPasskey;
pub use permission::{PermissionRow, Permissions, ADMIN_PERMISSION};
pub use service_account::ServiceAccount;
pub use subject::Subject;
pub use tenant::{Tenant, TenantContext};
pub use user::{Address, User, UserProfile};
