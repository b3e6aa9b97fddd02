//! Verification of Telegram web app launch payloads ("init data").
//!
//! The platform signs the payload with a key derived from the bot token:
//! `HMAC_SHA256(HMAC_SHA256("WebAppData", bot_token), data_check_string)`,
//! where the data check string is every `key=value` pair except `hash`,
//! ordered by key and joined with newlines. The `hash` itself must be
//! lowercase hex.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::{telegram::WebAppUser, users::UserIdentity};

type HmacSha256 = Hmac<Sha256>;

const SECRET_KEY_SEED: &[u8] = b"WebAppData";
const AUTH_SCHEME: &str = "tma ";

/// Why a launch payload was rejected.
///
/// Callers outside this module should treat every variant the same way:
/// the request is unauthorized.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),
    #[error("payload expired")]
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub user: UserIdentity,
    pub auth_date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InitDataValidator {
    secret_key: Vec<u8>,
    max_age: Option<Duration>,
}

impl InitDataValidator {
    pub fn new(bot_token: &str) -> Self {
        let secret_key = hmac_sha256(SECRET_KEY_SEED, bot_token.as_bytes());

        Self {
            secret_key,
            max_age: None,
        }
    }

    /// Reject payloads whose `auth_date` is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn validate(&self, raw: Option<&str>) -> Result<AuthenticatedIdentity, AuthError> {
        self.validate_at(raw, Utc::now())
    }

    pub fn validate_at(
        &self,
        raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let raw = raw.unwrap_or_default().trim_start();
        let raw = raw.strip_prefix(AUTH_SCHEME).unwrap_or(raw).trim();
        if raw.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        let mut hash = None;
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            if !seen.insert(key.clone()) {
                return Err(AuthError::InvalidSignature);
            }
            if key == "hash" {
                hash = Some(value.into_owned());
            } else {
                fields.push((key.into_owned(), value.into_owned()));
            }
        }

        let expected = hash
            .as_deref()
            .and_then(decode_signature)
            .ok_or(AuthError::InvalidSignature)?;

        let mut mac = new_mac(&self.secret_key);
        mac.update(data_check_string(&fields).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| AuthError::InvalidSignature)?;

        self.extract_identity(&fields, now)
    }

    fn extract_identity(
        &self,
        fields: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedIdentity, AuthError> {
        let field = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };

        let auth_date = field("auth_date")
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(AuthError::MalformedPayload("auth_date"))?;

        if let Some(max_age) = self.max_age {
            if now.signed_duration_since(auth_date) > max_age {
                return Err(AuthError::Expired);
            }
        }

        let user: WebAppUser = field("user")
            .and_then(|value| serde_json::from_str(value).ok())
            .ok_or(AuthError::MalformedPayload("user"))?;

        Ok(AuthenticatedIdentity {
            user: UserIdentity::new(user.id, user.username),
            auth_date,
        })
    }

    /// Sign `fields` the way the platform does and return the encoded
    /// payload, `hash` included.
    pub fn sign(&self, fields: &[(&str, &str)]) -> String {
        let owned: Vec<(String, String)> = fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        let signature = hmac_sha256(&self.secret_key, data_check_string(&owned).as_bytes());

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            serializer.append_pair(key, value);
        }
        serializer.append_pair("hash", &hex::encode(signature));
        serializer.finish()
    }

    /// Sign a payload for `user` issued at `auth_date`.
    pub fn sign_user(&self, user: &WebAppUser, auth_date: DateTime<Utc>) -> String {
        let user_json = serde_json::to_string(user).unwrap_or_default();
        let auth_date = auth_date.timestamp().to_string();

        self.sign(&[("auth_date", &auth_date), ("user", &user_json)])
    }
}

/// Validate `raw` against `bot_token` with no age limit.
pub fn validate_identity(
    raw: Option<&str>,
    bot_token: &str,
) -> Result<AuthenticatedIdentity, AuthError> {
    InitDataValidator::new(bot_token).validate(raw)
}

const SIGNATURE_HEX_LEN: usize = 64;

/// Only the canonical encoding is accepted, so a case change counts as
/// tampering.
fn decode_signature(hash: &str) -> Option<Vec<u8>> {
    let canonical = hash.len() == SIGNATURE_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !canonical {
        return None;
    }

    hex::decode(hash).ok()
}

fn data_check_string(fields: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = fields.iter().collect();
    sorted.sort();

    sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:TEST-TOKEN";

    fn alice() -> WebAppUser {
        WebAppUser {
            id: 42,
            first_name: "Alice".to_string(),
            last_name: None,
            username: Some("alice".to_string()),
            language_code: Some("en".to_string()),
        }
    }

    fn issued_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_valid_payload_yields_identity() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = validator.sign_user(&alice(), issued_at());

        let identity = validator.validate(Some(&raw)).unwrap();
        assert_eq!(identity.user.id, 42);
        assert_eq!(identity.user.handle.as_deref(), Some("alice"));
        assert_eq!(identity.auth_date, issued_at());
    }

    #[test]
    fn test_known_vector() {
        let raw = concat!(
            "auth_date=1700000000&query_id=AAE",
            "&user=%7B%22id%22%3A7%2C%22first_name%22%3A%22Bob%22%2C%22username%22%3A%22bob%22%7D",
            "&hash=aff147f541e25f9acec3529422e0dfea7bad114db2b11c0eda0215ba868e1236",
        );

        let identity = validate_identity(Some(raw), TOKEN).unwrap();
        assert_eq!(identity.user, UserIdentity::new(7, Some("bob".to_string())));
    }

    #[test]
    fn test_known_vector_with_prefixed_keys() {
        let raw = concat!(
            "auth_date=1700000000&a=1&a0=2",
            "&user=%7B%22id%22%3A7%2C%22first_name%22%3A%22Bob%22%2C%22username%22%3A%22bob%22%7D",
            "&hash=cedba6e1c3f92f1ba69d2477739b41cd51a6774598de2b7e8daae24396e441a9",
        );

        let identity = validate_identity(Some(raw), TOKEN).unwrap();
        assert_eq!(identity.user.id, 7);
    }

    #[test]
    fn test_data_check_string_orders_by_key() {
        let fields = vec![
            ("a0".to_string(), "2".to_string()),
            ("auth_date".to_string(), "1".to_string()),
            ("a".to_string(), "1".to_string()),
        ];

        assert_eq!(data_check_string(&fields), "a=1\na0=2\nauth_date=1");
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let validator = InitDataValidator::new(TOKEN);
        let user = r#"{"id":7,"first_name":"Bob"}"#;
        let raw = validator.sign(&[("user", user), ("auth_date", "1700000000")]);

        let identity = validator.validate(Some(&raw)).unwrap();
        assert_eq!(identity.user, UserIdentity::new(7, None));
    }

    #[test]
    fn test_scheme_prefix_is_accepted() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = format!("tma {}", validator.sign_user(&alice(), issued_at()));

        assert!(validator.validate(Some(&raw)).is_ok());
    }

    #[test]
    fn test_missing_credential() {
        let validator = InitDataValidator::new(TOKEN);

        assert_eq!(validator.validate(None), Err(AuthError::MissingCredential));
        assert_eq!(validator.validate(Some("")), Err(AuthError::MissingCredential));
        assert_eq!(validator.validate(Some("tma ")), Err(AuthError::MissingCredential));
    }

    #[test]
    fn test_wrong_token() {
        let raw = InitDataValidator::new("other:token").sign_user(&alice(), issued_at());

        assert_eq!(
            validate_identity(Some(&raw), TOKEN),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_any_tampered_byte_is_rejected() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = validator.sign_user(&alice(), issued_at());

        for position in 0..raw.len() {
            let mut bytes = raw.clone().into_bytes();
            bytes[position] = if bytes[position] == b'x' { b'y' } else { b'x' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert!(
                validator.validate(Some(&tampered)).is_err(),
                "tampered byte at {position} was accepted: {tampered}"
            );
        }
    }

    #[test]
    fn test_uppercase_hash_is_rejected() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = validator.sign_user(&alice(), issued_at());
        let (payload, hash) = raw.split_once("hash=").unwrap();
        let uppercased = format!("{payload}hash={}", hash.to_uppercase());

        assert_ne!(uppercased, raw);
        assert_eq!(
            validator.validate(Some(&uppercased)),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_any_case_flipped_hash_byte_is_rejected() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = validator.sign_user(&alice(), issued_at());
        let start = raw.find("hash=").unwrap() + "hash=".len();

        for position in start..raw.len() {
            let mut bytes = raw.clone().into_bytes();
            if !bytes[position].is_ascii_alphabetic() {
                continue;
            }
            bytes[position] = bytes[position].to_ascii_uppercase();
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                validator.validate(Some(&tampered)),
                Err(AuthError::InvalidSignature),
                "case flip at {position} was accepted: {tampered}"
            );
        }
    }

    #[test]
    fn test_malformed_input() {
        let validator = InitDataValidator::new(TOKEN);

        assert_eq!(
            validator.validate(Some("auth_date=1700000000")),
            Err(AuthError::InvalidSignature)
        );
        assert_eq!(
            validator.validate(Some("auth_date=1&hash=not-hex")),
            Err(AuthError::InvalidSignature)
        );
        assert_eq!(
            validator.validate(Some("%%%garbage")),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = validator.sign_user(&alice(), issued_at());
        let duplicated = format!("{raw}&auth_date=1700000000");

        assert_eq!(
            validator.validate(Some(&duplicated)),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_signed_payload_without_user() {
        let validator = InitDataValidator::new(TOKEN);
        let raw = validator.sign(&[("auth_date", "1700000000")]);

        assert_eq!(
            validator.validate(Some(&raw)),
            Err(AuthError::MalformedPayload("user"))
        );
    }

    #[test]
    fn test_max_age() {
        let validator = InitDataValidator::new(TOKEN).with_max_age(Duration::hours(1));
        let raw = validator.sign_user(&alice(), issued_at());

        let fresh = issued_at() + Duration::minutes(30);
        assert!(validator.validate_at(Some(&raw), fresh).is_ok());

        let stale = issued_at() + Duration::hours(2);
        assert_eq!(validator.validate_at(Some(&raw), stale), Err(AuthError::Expired));
    }
}
