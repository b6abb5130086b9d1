//! Token payloads: base claims, the refresh/MFA/OpenID variants, and the
//! unverified peek used to locate a token's tenant.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Address, Application, Subject, Tenant, UserProfile};

pub const OPENID_SCOPE: &str = "openid";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid timing: nbf={nbf} iat={iat} exp={exp}")]
    InvalidTiming { nbf: i64, iat: i64, exp: i64 },

    #[error("expected {expected} token, found {found}")]
    WrongTokenType { expected: TokenType, found: TokenType },

    #[error("openid claims require a user subject")]
    NotUserSubject,

    #[error("missing claim: {0}")]
    MissingClaim(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectType {
    User,
    ServiceAccount,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::ServiceAccount => "service-account",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenType {
    Bearer,
    Refresh,
    PasswordReset,
    Mfa,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Bearer => "bearer",
            TokenType::Refresh => "refresh",
            TokenType::PasswordReset => "password-reset",
            TokenType::Mfa => "mfa",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a space separated scope string into lower-cased, de-duplicated
/// scopes, keeping first-seen order.
pub fn parse_scopes(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for token in scope.split_whitespace() {
        let token = token.to_lowercase();
        if !scopes.contains(&token) {
            scopes.push(token);
        }
    }
    scopes
}

/// Typed token payload. Each variant checks its own invariants after decode.
pub trait TokenClaims: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn base(&self) -> &Claims;

    fn check(&self) -> Result<(), ClaimsError> {
        self.base().check_timing()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub sub_type: SubjectType,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub client_id: Uuid,
    pub aud: Vec<String>,
    pub nbf: i64,
    pub iat: i64,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub scope: Vec<String>,
}

impl Claims {
    /// Bearer claims for `subject`, expiring after the tenant's access lifetime.
    pub fn build(
        subject: &Subject,
        tenant: &Tenant,
        application: &Application,
        scope: &str,
        issuer: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let iat = now.timestamp();
        Self {
            sub: subject.id(),
            sub_type: subject.subject_type(),
            token_type: TokenType::Bearer,
            client_id: tenant.client_id,
            aud: application.audiences(),
            nbf: iat,
            iat,
            iss: issuer.to_string(),
            exp: iat + tenant.expires_in_seconds,
            scope: parse_scopes(scope),
        }
    }

    /// Same subject and audiences, retyped as a refresh token with the
    /// tenant's refresh lifetime.
    pub fn to_refresh(&self, tenant: &Tenant) -> Self {
        Self {
            token_type: TokenType::Refresh,
            exp: self.iat + tenant.refresh_expires_in_seconds,
            ..self.clone()
        }
    }

    /// Scope-less claims authorizing a single password change.
    pub fn password_reset(
        subject: &Subject,
        tenant: &Tenant,
        application: &Application,
        issuer: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let claims = Self::build(subject, tenant, application, "", issuer, now);
        Self {
            token_type: TokenType::PasswordReset,
            exp: claims.iat + tenant.reset_expires_in_seconds,
            ..claims
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    pub fn expect_type(&self, expected: TokenType) -> Result<(), ClaimsError> {
        if self.token_type == expected {
            Ok(())
        } else {
            Err(ClaimsError::WrongTokenType {
                expected,
                found: self.token_type,
            })
        }
    }

    /// `nbf <= iat < exp`
    pub fn check_timing(&self) -> Result<(), ClaimsError> {
        if self.nbf <= self.iat && self.iat < self.exp {
            Ok(())
        } else {
            Err(ClaimsError::InvalidTiming {
                nbf: self.nbf,
                iat: self.iat,
                exp: self.exp,
            })
        }
    }
}

impl TokenClaims for Claims {
    fn base(&self) -> &Claims {
        self
    }
}

/// Password-reset claims. The `jti` is redeemed on confirmation, so each
/// emailed token sets a password at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetClaims {
    #[serde(flatten)]
    pub claims: Claims,
    pub jti: Uuid,
}

impl PasswordResetClaims {
    pub fn new(
        subject: &Subject,
        tenant: &Tenant,
        application: &Application,
        issuer: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            claims: Claims::password_reset(subject, tenant, application, issuer, now),
            jti: Uuid::new_v4(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.claims.exp, 0).unwrap_or_else(Utc::now)
    }
}

impl TokenClaims for PasswordResetClaims {
    fn base(&self) -> &Claims {
        &self.claims
    }

    fn check(&self) -> Result<(), ClaimsError> {
        self.claims.check_timing()?;
        self.claims.expect_type(TokenType::PasswordReset)
    }
}

/// Restricted claims issued while a second factor is pending. Carries the
/// grant that started the flow so step-up can finish it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaClaims {
    #[serde(flatten)]
    pub claims: Claims,
    pub grant_type: String,
}

impl MfaClaims {
    pub fn new(claims: Claims, grant_type: &str) -> Self {
        Self {
            claims: Claims {
                token_type: TokenType::Mfa,
                ..claims
            },
            grant_type: grant_type.to_string(),
        }
    }
}

impl TokenClaims for MfaClaims {
    fn base(&self) -> &Claims {
        &self.claims
    }

    fn check(&self) -> Result<(), ClaimsError> {
        self.claims.check_timing()?;
        self.claims.expect_type(TokenType::Mfa)?;
        if self.grant_type.is_empty() {
            return Err(ClaimsError::MissingClaim("grant_type"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OpenIdAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl From<&Address> for OpenIdAddress {
    fn from(address: &Address) -> Self {
        Self {
            street_address: address.street_address.clone(),
            locality: address.locality.clone(),
            region: address.region.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

/// Standard OpenID profile claims; absent values are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct OpenIdProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoneinfo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<OpenIdAddress>,
}

impl From<&UserProfile> for OpenIdProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            email: profile.email.clone(),
            email_verified: profile.email.as_ref().map(|_| profile.email_verified),
            phone_number: profile.phone_number.clone(),
            phone_number_verified: profile
                .phone_number
                .as_ref()
                .map(|_| profile.phone_number_verified),
            name: profile.name.clone(),
            given_name: profile.given_name.clone(),
            family_name: profile.family_name.clone(),
            middle_name: profile.middle_name.clone(),
            nickname: profile.nickname.clone(),
            profile: profile.profile.clone(),
            picture: profile.picture.clone(),
            website: profile.website.clone(),
            gender: profile.gender.clone(),
            birthdate: profile.birthdate.clone(),
            zoneinfo: profile.zoneinfo.clone(),
            locale: profile.locale.clone(),
            address: (!profile.address.is_empty()).then(|| OpenIdAddress::from(&profile.address)),
        }
    }
}

/// ID token payload: base claims plus the user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdClaims {
    #[serde(flatten)]
    pub claims: Claims,
    #[serde(flatten)]
    pub profile: OpenIdProfile,
}

impl OpenIdClaims {
    pub fn build(claims: &Claims, profile: &UserProfile) -> Result<Self, ClaimsError> {
        if claims.sub_type != SubjectType::User {
            return Err(ClaimsError::NotUserSubject);
        }
        Ok(Self {
            claims: claims.clone(),
            profile: OpenIdProfile::from(profile),
        })
    }
}

impl TokenClaims for OpenIdClaims {
    fn base(&self) -> &Claims {
        &self.claims
    }

    fn check(&self) -> Result<(), ClaimsError> {
        self.claims.check_timing()?;
        if self.claims.sub_type != SubjectType::User {
            return Err(ClaimsError::NotUserSubject);
        }
        Ok(())
    }
}

/// Token payload read without verifying the signature.
///
/// Only tells the caller which tenant's key to verify with next. Nothing in
/// it may be trusted, so it exposes no subject and no conversion to [`Claims`].
#[derive(Debug, Deserialize)]
pub struct UnverifiedClaims {
    client_id: Uuid,
    #[serde(rename = "type")]
    token_type: TokenType,
    #[serde(default)]
    scope: Vec<String>,
}

impl UnverifiedClaims {
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }
}

pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(ClaimsError::Malformed(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClaimsError::Malformed(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_scopes_normalizes() {
        assert_eq!(
            parse_scopes("  OpenID profile openid  Email "),
            vec!["openid", "profile", "email"]
        );
        assert!(parse_scopes("   ").is_empty());
    }

    #[test]
    fn test_build_claims() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let application = fixtures::application();
        let subject = Subject::User(fixtures::user("alice", "hunter2"));

        let claims = Claims::build(
            &subject,
            &tenant,
            &application,
            "openid Profile",
            "https://id.example.test",
            now(),
        );

        assert_eq!(claims.sub, subject.id());
        assert_eq!(claims.sub_type, SubjectType::User);
        assert_eq!(claims.token_type, TokenType::Bearer);
        assert_eq!(claims.client_id, tenant.client_id);
        assert_eq!(claims.aud, application.audiences());
        assert_eq!(claims.iat, now().timestamp());
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.exp, claims.iat + tenant.expires_in_seconds);
        assert_eq!(claims.scope, vec!["openid", "profile"]);
        assert!(claims.check_timing().is_ok());
    }

    #[test]
    fn test_refresh_claims_use_refresh_lifetime() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let claims = Claims::build(&subject, &tenant, &fixtures::application(), "", "iss", now());

        let refresh = claims.to_refresh(&tenant);

        assert_eq!(refresh.token_type, TokenType::Refresh);
        assert_eq!(refresh.exp, claims.iat + tenant.refresh_expires_in_seconds);
        assert_eq!(refresh.sub, claims.sub);
        assert_eq!(refresh.aud, claims.aud);
    }

    #[test]
    fn test_password_reset_claims() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let claims =
            Claims::password_reset(&subject, &tenant, &fixtures::application(), "iss", now());

        assert_eq!(claims.token_type, TokenType::PasswordReset);
        assert_eq!(claims.exp, claims.iat + tenant.reset_expires_in_seconds);
        assert!(claims.scope.is_empty());
    }

    #[test]
    fn test_reset_claims_carry_distinct_ids() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let application = fixtures::application();
        let first = PasswordResetClaims::new(&subject, &tenant, &application, "iss", now());
        let second = PasswordResetClaims::new(&subject, &tenant, &application, "iss", now());

        assert_ne!(first.jti, second.jti);
        assert_eq!(first.expires_at().timestamp(), first.claims.exp);
        assert!(first.check().is_ok());

        let bearer = PasswordResetClaims {
            claims: Claims::build(&subject, &tenant, &application, "", "iss", now()),
            jti: first.jti,
        };
        assert!(matches!(
            bearer.check(),
            Err(ClaimsError::WrongTokenType { .. })
        ));
    }

    #[test]
    fn test_timing_invariant() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let mut claims = Claims::build(&subject, &tenant, &fixtures::application(), "", "iss", now());
        claims.exp = claims.iat;
        assert!(matches!(
            claims.check_timing(),
            Err(ClaimsError::InvalidTiming { .. })
        ));
    }

    #[test]
    fn test_openid_claims_require_user() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::ServiceAccount(fixtures::service_account("ci", "secret"));
        let claims = Claims::build(&subject, &tenant, &fixtures::application(), "openid", "iss", now());

        assert_eq!(
            OpenIdClaims::build(&claims, &UserProfile::default()),
            Err(ClaimsError::NotUserSubject)
        );
    }

    #[test]
    fn test_openid_claims_omit_absent_fields() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let claims = Claims::build(&subject, &tenant, &fixtures::application(), "openid", "iss", now());
        let profile = UserProfile {
            email: Some("alice@example.test".to_string()),
            email_verified: true,
            given_name: Some("Alice".to_string()),
            ..UserProfile::default()
        };

        let openid = OpenIdClaims::build(&claims, &profile).unwrap();
        let json = serde_json::to_value(&openid).unwrap();

        assert_eq!(json["email"], "alice@example.test");
        assert_eq!(json["email_verified"], true);
        assert_eq!(json["given_name"], "Alice");
        assert_eq!(json["type"], "bearer");
        assert!(json.get("phone_number").is_none());
        assert!(json.get("phone_number_verified").is_none());
        assert!(json.get("address").is_none());
    }

    #[test]
    fn test_mfa_claims_wire_shape() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let claims = Claims::build(&subject, &tenant, &fixtures::application(), "openid", "iss", now());

        let mfa = MfaClaims::new(claims, "password");
        let json = serde_json::to_value(&mfa).unwrap();

        assert_eq!(json["type"], "mfa");
        assert_eq!(json["grant_type"], "password");
        assert_eq!(json["sub_type"], "user");
        assert!(mfa.check().is_ok());

        let decoded: MfaClaims = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, mfa);
    }

    #[test]
    fn test_mfa_claims_reject_other_types() {
        let tenant = fixtures::hmac_tenant("s3cr3t");
        let subject = Subject::User(fixtures::user("alice", "hunter2"));
        let claims = Claims::build(&subject, &tenant, &fixtures::application(), "", "iss", now());
        let forged = MfaClaims {
            claims,
            grant_type: "password".to_string(),
        };
        assert!(matches!(
            forged.check(),
            Err(ClaimsError::WrongTokenType { .. })
        ));
    }

    #[test]
    fn test_decode_unverified() {
        let client_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "client_id": client_id,
            "type": "refresh",
            "scope": ["openid"],
            "sub": 7,
        });
        let token = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload.to_string()),
            "not-a-signature"
        );

        let unverified = decode_unverified(&token).unwrap();

        assert_eq!(unverified.client_id(), client_id);
        assert_eq!(unverified.token_type(), TokenType::Refresh);
        assert_eq!(unverified.scope(), ["openid".to_string()]);
    }

    #[test]
    fn test_decode_unverified_rejects_malformed() {
        assert!(matches!(
            decode_unverified("only.two"),
            Err(ClaimsError::Malformed(_))
        ));
        assert!(matches!(
            decode_unverified("a.!!!.c"),
            Err(ClaimsError::Malformed(_))
        ));
        let not_claims = format!("a.{}.c", URL_SAFE_NO_PAD.encode(b"{\"hello\":1}"));
        assert!(matches!(
            decode_unverified(&not_claims),
            Err(ClaimsError::Malformed(_))
        ));
    }
}
