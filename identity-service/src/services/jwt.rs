//! Per-tenant token signing and validation.
//!
//! Every tenant names its own algorithm. HMAC tenants sign and verify with the
//! shared secret stored as the private key; asymmetric tenants sign with the
//! private PEM and verify with the public PEM.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rsa::{
    pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, RsaPublicKey,
};
use std::str::FromStr;

use super::claims::TokenClaims;
use super::ServiceError;
use crate::dtos::Jwk;
use crate::models::Tenant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

fn key_family(algorithm: Algorithm) -> KeyFamily {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => KeyFamily::Rsa,
        Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
        Algorithm::EdDSA => KeyFamily::Ed,
    }
}

/// The algorithm configured on the tenant.
pub fn tenant_algorithm(tenant: &Tenant) -> Result<Algorithm, jsonwebtoken::errors::Error> {
    Algorithm::from_str(&tenant.algorithm)
}

fn encoding_key(
    tenant: &Tenant,
    algorithm: Algorithm,
) -> Result<EncodingKey, jsonwebtoken::errors::Error> {
    let private_key = tenant.private_key.as_bytes();
    match key_family(algorithm) {
        KeyFamily::Hmac => Ok(EncodingKey::from_secret(private_key)),
        KeyFamily::Rsa => EncodingKey::from_rsa_pem(private_key),
        KeyFamily::Ec => EncodingKey::from_ec_pem(private_key),
        KeyFamily::Ed => EncodingKey::from_ed_pem(private_key),
    }
}

fn decoding_key(tenant: &Tenant, algorithm: Algorithm) -> Result<DecodingKey, ServiceError> {
    let public_key = || {
        tenant
            .public_key
            .as_deref()
            .map(str::as_bytes)
            .ok_or_else(|| ServiceError::InvalidToken("tenant has no public key".to_string()))
    };

    let key = match key_family(algorithm) {
        KeyFamily::Hmac => return Ok(DecodingKey::from_secret(tenant.private_key.as_bytes())),
        KeyFamily::Rsa => DecodingKey::from_rsa_pem(public_key()?),
        KeyFamily::Ec => DecodingKey::from_ec_pem(public_key()?),
        KeyFamily::Ed => DecodingKey::from_ed_pem(public_key()?),
    };
    key.map_err(|e| ServiceError::InvalidToken(format!("tenant public key unusable: {}", e)))
}

/// Sign `claims` with the tenant's algorithm and key.
pub fn sign<C: TokenClaims>(claims: &C, tenant: &Tenant) -> Result<String, ServiceError> {
    let algorithm = tenant_algorithm(tenant).map_err(|e| {
        anyhow::anyhow!(
            "Tenant {} has unsupported algorithm {}: {}",
            tenant.id,
            tenant.algorithm,
            e
        )
    })?;
    let key = encoding_key(tenant, algorithm)
        .map_err(|e| anyhow::anyhow!("Tenant {} signing key is malformed: {}", tenant.id, e))?;

    encode(&Header::new(algorithm), claims, &key)
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
}

/// Verify `token` against the tenant and decode it as `C`.
///
/// The header algorithm must equal the tenant's algorithm; signature, `exp`
/// and `nbf` are checked with no leeway, then the variant's own field checks run.
pub fn validate<C: TokenClaims>(token: &str, tenant: &Tenant) -> Result<C, ServiceError> {
    let algorithm = tenant_algorithm(tenant)
        .map_err(|e| ServiceError::InvalidToken(format!("tenant algorithm unusable: {}", e)))?;

    let header = decode_header(token)
        .map_err(|e| ServiceError::InvalidToken(format!("malformed header: {}", e)))?;
    if header.alg != algorithm {
        return Err(ServiceError::InvalidToken(format!(
            "algorithm {:?} does not match tenant algorithm {:?}",
            header.alg, algorithm
        )));
    }

    let key = decoding_key(tenant, algorithm)?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "nbf"]);

    let data = decode::<C>(token, &key, &validation)
        .map_err(|e| ServiceError::InvalidToken(e.to_string()))?;

    let claims = data.claims;
    claims
        .check()
        .map_err(|e| ServiceError::InvalidToken(e.to_string()))?;
    if claims.base().client_id != tenant.client_id {
        return Err(ServiceError::InvalidToken(
            "client_id does not belong to tenant".to_string(),
        ));
    }

    Ok(claims)
}

/// The tenant's verification key as a JWK.
///
/// Only RSA tenants publish a key: HMAC secrets are never exposed and EC/Ed
/// keys are not advertised yet, so those yield `None`.
pub fn public_jwk(tenant: &Tenant) -> Result<Option<Jwk>, ServiceError> {
    let algorithm = tenant_algorithm(tenant).map_err(|e| {
        anyhow::anyhow!(
            "Tenant {} has unsupported algorithm {}: {}",
            tenant.id,
            tenant.algorithm,
            e
        )
    })?;
    if key_family(algorithm) != KeyFamily::Rsa {
        return Ok(None);
    }

    let pem = tenant
        .public_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Tenant {} has no public key", tenant.id))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| anyhow::anyhow!("Tenant {} public key is malformed: {}", tenant.id, e))?;

    Ok(Some(Jwk {
        kty: "RSA".to_string(),
        use_: "sig".to_string(),
        alg: tenant.algorithm.clone(),
        kid: tenant.client_id.to_string(),
        n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    }))
}
