//! Opaque session tokens. A token carries no decodable tenant data; the
//! tenant id is only known after the server-side lookup.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::shared::models::SessionRecord;

const TOKEN_LENGTH: usize = 48;
const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

pub fn new_session(user_id: Uuid, ttl_hours: i64) -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        token: generate_token(),
        user_id,
        created_at: now,
        expires_at: now + Duration::hours(ttl_hours),
        revoked: false,
    }
}

pub fn is_session_valid(session: &SessionRecord, now: DateTime<Utc>) -> bool {
    !session.revoked && now < session.expires_at
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_fresh_session_is_valid() {
        let session = new_session(Uuid::new_v4(), 24);
        assert!(is_session_valid(&session, Utc::now()));
    }

    #[test]
    fn test_expired_session_is_invalid() {
        let session = new_session(Uuid::new_v4(), 24);
        let later = Utc::now() + Duration::hours(25);
        assert!(!is_session_valid(&session, later));
    }

    #[test]
    fn test_revoked_session_is_invalid() {
        let mut session = new_session(Uuid::new_v4(), 24);
        session.revoked = true;
        assert!(!is_session_valid(&session, Utc::now()));
    }
}
