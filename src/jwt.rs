use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by the hosted auth provider's access tokens. Only the
/// subject (the user id) and expiry matter here.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // The provider sets aud per project; the signature and expiry are what
    // this service checks.
    validation.validate_aud = false;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, sub: &str, exp: usize) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode token")
    }

    #[test]
    fn valid_token_round_trips() {
        let token = make_token("s3cret", "0b9fbc44-9c0b-4ef8-bb6d-6bb9bd380a11", 4102444800);
        let claims = validate_token(&token, "s3cret").expect("token should validate");
        assert_eq!(claims.sub, "0b9fbc44-9c0b-4ef8-bb6d-6bb9bd380a11");
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = make_token("s3cret", "user", 4102444800);
        assert!(validate_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = make_token("s3cret", "user", 1000);
        assert!(validate_token(&token, "s3cret").is_err());
    }
}
