use webauthn_rs::prelude::Passkey;

/// A registered WebAuthn credential.
#[derive(Debug, Clone)]
pub struct StoredPasskey {
    pub user_id: i32,
    pub application_id: i32,
    pub credential_id: Vec<u8>,
    pub passkey: Passkey,
}

impl StoredPasskey {
    pub fn new(user_id: i32, application_id: i32, passkey: Passkey) -> Self {
        Self {
            user_id,
            application_id,
            credential_id: passkey.cred_id().as_slice().to_vec(),
            passkey,
        }
    }
}
