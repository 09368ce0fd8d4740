//! Identity collaborator seam.
//!
//! Credential issuance lives outside this layer; all the registry needs is
//! `verify(token) -> user id | invalid`. [`SignedTokenVerifier`] is the
//! bundled implementation: tokens are Ed25519-signed by the identity
//! service and verified offline against its public key, so authentication
//! never leaves the process.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use tracing::debug;
use uuid::Uuid;

use causerie_shared::UserId;

/// Verifies an opaque credential token and yields the subject it names.
pub trait IdentityVerifier: Send + Sync {
    /// Returns the authenticated user id, or `None` for any invalid,
    /// malformed, or expired token.
    fn verify(&self, token: &str) -> Option<UserId>;
}

// Token layout, base64-encoded:
//   16 bytes  user uuid
//   N bytes   expiry, RFC 3339
//   64 bytes  Ed25519 signature over the preceding bytes
const UUID_LEN: usize = 16;
const SIGNATURE_LEN: usize = 64;

/// Verifier for tokens signed by the identity service's Ed25519 key.
#[derive(Clone)]
pub struct SignedTokenVerifier {
    issuer_key: VerifyingKey,
}

impl SignedTokenVerifier {
    /// Build a verifier from the issuer's raw public key bytes.
    pub fn new(issuer_pubkey: &[u8; 32]) -> Option<Self> {
        VerifyingKey::from_bytes(issuer_pubkey)
            .ok()
            .map(|issuer_key| Self { issuer_key })
    }
}

impl IdentityVerifier for SignedTokenVerifier {
    fn verify(&self, token: &str) -> Option<UserId> {
        let raw = BASE64.decode(token).ok()?;
        if raw.len() <= UUID_LEN + SIGNATURE_LEN {
            return None;
        }

        let (payload, signature_bytes) = raw.split_at(raw.len() - SIGNATURE_LEN);
        let signature = Signature::from_slice(signature_bytes).ok()?;
        if self.issuer_key.verify(payload, &signature).is_err() {
            debug!("credential token signature rejected");
            return None;
        }

        let (uuid_bytes, expiry_bytes) = payload.split_at(UUID_LEN);
        let expiry: DateTime<Utc> = std::str::from_utf8(expiry_bytes)
            .ok()?
            .parse::<DateTime<chrono::FixedOffset>>()
            .ok()?
            .with_timezone(&Utc);
        if Utc::now() > expiry {
            debug!("credential token expired");
            return None;
        }

        let uuid = Uuid::from_slice(uuid_bytes).ok()?;
        Some(UserId(uuid))
    }
}

/// Verifier used when no issuer key is configured: every token is
/// rejected, so an unconfigured deployment fails closed.
pub struct RejectAllVerifier;

impl IdentityVerifier for RejectAllVerifier {
    fn verify(&self, _token: &str) -> Option<UserId> {
        None
    }
}

/// Issues tokens in the format [`SignedTokenVerifier`] accepts.
///
/// Stands in for the external identity service in the bundled server and in
/// tests.
pub struct TokenIssuer {
    signing_key: SigningKey,
}

impl TokenIssuer {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// The matching verifier for tokens issued by this key.
    pub fn verifier(&self) -> SignedTokenVerifier {
        SignedTokenVerifier {
            issuer_key: self.signing_key.verifying_key(),
        }
    }

    /// The issuer's public key bytes, for configuration handoff.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a token naming `user`, valid until `expiry`.
    pub fn issue(&self, user: UserId, expiry: DateTime<Utc>) -> String {
        let mut payload = Vec::new();
        payload.extend_from_slice(user.0.as_bytes());
        payload.extend_from_slice(expiry.to_rfc3339().as_bytes());

        let signature = self.signing_key.sign(&payload);
        payload.extend_from_slice(&signature.to_bytes());

        BASE64.encode(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::OsRng;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SigningKey::generate(&mut OsRng))
    }

    #[test]
    fn valid_token_yields_subject() {
        let issuer = issuer();
        let user = UserId::new();
        let token = issuer.issue(user, Utc::now() + Duration::hours(24));

        assert_eq!(issuer.verifier().verify(&token), Some(user));
    }

    #[test]
    fn expired_token_rejected() {
        let issuer = issuer();
        let token = issuer.issue(UserId::new(), Utc::now() - Duration::seconds(1));

        assert_eq!(issuer.verifier().verify(&token), None);
    }

    #[test]
    fn wrong_issuer_rejected() {
        let issuer = issuer();
        let other = self::issuer();
        let token = issuer.issue(UserId::new(), Utc::now() + Duration::hours(1));

        assert_eq!(other.verifier().verify(&token), None);
    }

    #[test]
    fn garbage_tokens_rejected() {
        let verifier = issuer().verifier();
        assert_eq!(verifier.verify(""), None);
        assert_eq!(verifier.verify("not base64 !!!"), None);
        assert_eq!(verifier.verify(&BASE64.encode([0u8; 10])), None);
    }
}
