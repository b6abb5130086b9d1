pub mod auth;
pub mod tenant;

pub use auth::{authorize, authorized_middleware, mfa_authorized_middleware, AuthContext};
pub use tenant::{tenant_middleware, TENANT_ID_HEADER};
