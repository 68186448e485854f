use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access tokens live for 15 minutes; refresh tokens carry the session.
pub const ACCESS_TOKEN_MINUTES: i64 = 15;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, name: String) -> Self {
        Self {
            sub: user_id,
            name,
            exp: (Utc::now() + Duration::minutes(ACCESS_TOKEN_MINUTES)).timestamp(),
        }
    }
}

pub fn encode_token(claims: &Claims, secret: &str) -> Result<String, String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| format!("JWT encode failed: {e}"))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("JWT decode failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_and_wrong_secret() {
        let user_id = Uuid::now_v7();
        let token = encode_token(&Claims::new(user_id, "Ada".to_string()), "secret-one").unwrap();

        let claims = decode_token(&token, "secret-one").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.name, "Ada");
        assert!(decode_token(&token, "secret-two").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(Uuid::now_v7(), "Ada".to_string());
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        let token = encode_token(&claims, "secret").unwrap();
        assert!(decode_token(&token, "secret").is_err());
    }
}
