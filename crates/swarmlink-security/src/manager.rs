//! Token issuance/verification and per-tenant authenticated encryption.

use crate::error::{SecurityError, SecurityResult};
use crate::token::{AgentTokenPayload, EncryptedPayload, TenantKeys};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, Tag};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Static token header segment, before base64 encoding.
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"SLT"}"#;

/// Issues and verifies agent tokens and holds per-tenant key material.
///
/// One manager wraps one shared secret. Tokens from two managers with the
/// same secret verify interchangeably; the per-tenant key cache does not
/// transfer (each manager draws its own nonces). Share a manager between
/// components behind an `Arc`.
pub struct SecurityManager {
    secret: String,
    key_cache: DashMap<String, TenantKeys>,
}

impl SecurityManager {
    /// Create a manager around a shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            key_cache: DashMap::new(),
        }
    }

    /// Issue a signed token for `payload`, stamping the issue time.
    ///
    /// The token is `header.payload.signature`, each segment URL-safe
    /// base64 without padding, signed with HMAC-SHA256 over the first two
    /// segments. Deterministic for a given secret and payload except for
    /// the issue timestamp.
    pub fn create_token(&self, payload: &AgentTokenPayload) -> String {
        let mut claims = payload.clone();
        claims.iat = Utc::now().timestamp_millis();

        let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER);
        let body = URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims).expect("token claims always serialize"));
        let signing_input = format!("{header}.{body}");
        let signature = self.sign(signing_input.as_bytes());
        format!("{signing_input}.{signature}")
    }

    /// Verify a token and return its decoded claims.
    ///
    /// Checks run in order: segment shape, signature (constant-time),
    /// expiry. A tampered payload fails the signature check, never the
    /// format check.
    pub fn verify_token(&self, token: &str) -> SecurityResult<AgentTokenPayload> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(SecurityError::InvalidFormat);
        }

        let signing_input_len = parts[0].len() + 1 + parts[1].len();
        let expected = self.sign(token[..signing_input_len].as_bytes());
        let signature_ok: bool =
            subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), parts[2].as_bytes()).into();
        if !signature_ok {
            return Err(SecurityError::InvalidSignature);
        }

        let body = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| SecurityError::InvalidFormat)?;
        let claims: AgentTokenPayload =
            serde_json::from_slice(&body).map_err(|_| SecurityError::InvalidFormat)?;

        if claims.expires_at < Utc::now().timestamp_millis() {
            return Err(SecurityError::TokenExpired);
        }
        Ok(claims)
    }

    /// Derive-or-fetch the symmetric key material for a tenant.
    ///
    /// The key is SHA-256(tenant_id || secret); the nonce is drawn randomly
    /// on first use and cached with the key for this manager's lifetime, so
    /// repeated calls return identical material (required for round-trip
    /// decrypt). Reusing one nonce per tenant means ciphertexts from the
    /// same tenant are not independently secure across time; tolerable only
    /// while managers live no longer than the agent that owns them.
    pub fn tenant_keys(&self, tenant_id: &str) -> TenantKeys {
        if let Some(keys) = self.key_cache.get(tenant_id) {
            return keys.clone();
        }

        let mut hasher = Sha256::new();
        hasher.update(tenant_id.as_bytes());
        hasher.update(self.secret.as_bytes());
        let digest = hasher.finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        self.key_cache
            .entry(tenant_id.to_string())
            .or_insert(TenantKeys { key, nonce })
            .value()
            .clone()
    }

    /// Encrypt `plaintext` under the tenant's cached key material.
    pub fn encrypt(&self, plaintext: &str, tenant_id: &str) -> SecurityResult<EncryptedPayload> {
        let keys = self.tenant_keys(tenant_id);
        let cipher = Aes256Gcm::new_from_slice(&keys.key)
            .map_err(|e| SecurityError::EncryptionFailed(e.to_string()))?;

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&keys.nonce), b"", &mut buffer)
            .map_err(|e| SecurityError::EncryptionFailed(e.to_string()))?;

        Ok(EncryptedPayload {
            ciphertext: hex::encode(buffer),
            auth_tag: hex::encode(tag),
        })
    }

    /// Decrypt a payload produced by [`SecurityManager::encrypt`].
    ///
    /// Fails when the authentication tag does not match, which signals
    /// tampering or a tenant-key mismatch.
    pub fn decrypt(
        &self,
        ciphertext: &str,
        auth_tag: &str,
        tenant_id: &str,
    ) -> SecurityResult<String> {
        let keys = self.tenant_keys(tenant_id);
        let cipher = Aes256Gcm::new_from_slice(&keys.key)
            .map_err(|e| SecurityError::DecryptionFailed(e.to_string()))?;

        let mut buffer =
            hex::decode(ciphertext).map_err(|e| SecurityError::DecryptionFailed(e.to_string()))?;
        let tag_bytes =
            hex::decode(auth_tag).map_err(|e| SecurityError::DecryptionFailed(e.to_string()))?;
        if tag_bytes.len() != 16 {
            return Err(SecurityError::DecryptionFailed(
                "auth tag must be 16 bytes".into(),
            ));
        }

        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&keys.nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| SecurityError::DecryptionFailed("authentication tag mismatch".into()))?;

        String::from_utf8(buffer).map_err(|e| SecurityError::DecryptionFailed(e.to_string()))
    }

    /// The single tenant-isolation gate. Every storage operation checks
    /// this before touching data on behalf of a caller.
    pub fn validate_tenant_access(&self, request_tenant: &str, data_tenant: &str) -> bool {
        request_tenant == data_tenant
    }

    /// SHA-256 content fingerprint, hex encoded.
    pub fn hash_data(&self, data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Cryptographically random opaque id (64 hex chars).
    pub fn generate_secure_id(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Drop all cached tenant keys. The next use of a tenant draws a fresh
    /// nonce, so payloads encrypted before the clear no longer decrypt.
    pub fn clear_key_cache(&self) {
        self.key_cache.clear();
    }

    fn sign(&self, data: &[u8]) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(data);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}
