use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::domain::ConsentRequestId;

type HmacSha256 = Hmac<Sha256>;

/// Error raised for invalid issue/verify arguments. Verification failures
/// driven by the token contents are never errors; see [`TokenVerification`].
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token must not be empty")]
    EmptyToken,
    #[error("token claims could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Claims carried by the consent token. The wire names match the consent
/// portal's existing contract.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    #[serde(rename = "ConsentRequestId")]
    consent_request_id: String,
    #[serde(rename = "ConsentRequestExpiryDate")]
    expiry_date: String,
    exp: i64,
}

#[derive(Serialize)]
struct TokenHeader {
    alg: &'static str,
    typ: &'static str,
}

/// A freshly minted token together with its computed expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// Outcome of verifying an externally supplied token.
///
/// `Rejected` is a first-class value rather than an error: the input comes
/// from a clicked email link and may be stale, truncated, or forged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    Accepted {
        consent_request_id: ConsentRequestId,
        expiry: DateTime<Utc>,
    },
    Rejected,
}

/// Issues and verifies the signed expiring token embedded in consent email
/// links. Possession of a valid, unexpired token is the sole authorization
/// for the consent-confirmation action.
pub struct ConsentTokenService {
    secret: Vec<u8>,
}

impl ConsentTokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issues a token valid for `validity_days` from now.
    pub fn issue(
        &self,
        consent_request_id: ConsentRequestId,
        validity_days: u32,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(Utc::now(), consent_request_id, validity_days)
    }

    /// Issues a token anchored at an explicit instant. The expiry is rounded
    /// up to 23:59:59 of the target calendar day, so every token issued on
    /// the same day expires at the same moment regardless of time of day.
    pub fn issue_at(
        &self,
        now: DateTime<Utc>,
        consent_request_id: ConsentRequestId,
        validity_days: u32,
    ) -> Result<IssuedToken, TokenError> {
        let expires = end_of_day(now + Duration::days(i64::from(validity_days)));

        let claims = TokenClaims {
            consent_request_id: consent_request_id.to_string(),
            expiry_date: expires.to_rfc3339(),
            exp: expires.timestamp(),
        };

        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&TokenHeader {
            alg: "HS256",
            typ: "JWT",
        })?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(header.as_bytes(), payload.as_bytes()));

        Ok(IssuedToken {
            token: format!("{header}.{payload}.{signature}"),
            expires,
        })
    }

    /// Verifies the MAC and expiry of a token. An empty token is an invalid
    /// argument; every other failure mode collapses to `Rejected`.
    pub fn verify(&self, token: &str) -> Result<TokenVerification, TokenError> {
        self.verify_at(Utc::now(), token)
    }

    pub fn verify_at(
        &self,
        now: DateTime<Utc>,
        token: &str,
    ) -> Result<TokenVerification, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::EmptyToken);
        }

        Ok(self.decode(now, token).unwrap_or(TokenVerification::Rejected))
    }

    fn decode(&self, now: DateTime<Utc>, token: &str) -> Option<TokenVerification> {
        let mut segments = token.split('.');
        let header = segments.next()?;
        let payload = segments.next()?;
        let signature = segments.next()?;
        if segments.next().is_some() {
            return None;
        }

        let presented = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let computed = self.sign(header.as_bytes(), payload.as_bytes());
        if presented.len() != computed.len() {
            return None;
        }
        if !bool::from(presented.ct_eq(computed.as_slice())) {
            return None;
        }

        let claims: TokenClaims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
        if now.timestamp() > claims.exp {
            return None;
        }

        let consent_request_id = ConsentRequestId(claims.consent_request_id.parse().ok()?);
        let expiry = DateTime::parse_from_rfc3339(&claims.expiry_date)
            .ok()?
            .with_timezone(&Utc);

        Some(TokenVerification::Accepted {
            consent_request_id,
            expiry,
        })
    }

    fn sign(&self, header: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC-SHA-256 accepts keys of any length");
        mac.update(header);
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

fn end_of_day(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let end = timestamp
        .date_naive()
        .and_hms_opt(23, 59, 59)
        .expect("23:59:59 is a valid wall-clock time");
    DateTime::from_naive_utc_and_offset(end, Utc)
}
