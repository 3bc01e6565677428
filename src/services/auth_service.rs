use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;
use tracing::info;

use crate::ws::Identity;

/// A caller whose token has been validated.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    pub roles: Vec<String>,
    /// `user` or `service`
    pub token_type: String,
}

// Get the auth token from a request
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(header::COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|_| "Invalid Cookie header".to_string())?;
        for c in cookie::Cookie::split_parse(cookie_str).flatten() {
            if c.name() == "auth_token" {
                return Ok(c.value().to_string());
            }
        }
    }

    // 3. Browsers cannot set headers on a WebSocket handshake, so accept a query parameter
    match query_token {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err("Missing Authorization header, auth_token cookie or token parameter".to_string()),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

// Build the caller from validated claims
pub fn authenticated_from_claims(claims: &Value) -> Result<Authenticated, String> {
    let user_id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "JWT token does not contain 'sub' claim".to_string())?;

    let username = ["name", "username"]
        .iter()
        .find_map(|key| claims.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .unwrap_or(user_id);

    let roles = match claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles_array) => roles_array.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    };

    let token_type = claims
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("user")
        .to_string();

    Ok(Authenticated {
        identity: Identity {
            user_id: user_id.to_string(),
            username: username.to_string(),
        },
        roles,
        token_type,
    })
}

/// Extract and validate the caller's token.
pub fn authenticate(headers: &HeaderMap, query_token: Option<&str>, secret: Option<&str>) -> Result<Authenticated, String> {
    let secret = secret.ok_or_else(|| "No JWT secret configured!".to_string())?;
    let token = get_auth_token(headers, query_token)?;
    let token_data = validate_jwt(&token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;
    let authenticated = authenticated_from_claims(&token_data.claims)?;
    info!("JWT token validated successfully for user: {}", authenticated.identity.user_id);
    Ok(authenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn exp() -> i64 {
        chrono::Utc::now().timestamp() + 600
    }

    #[test]
    fn bearer_header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(get_auth_token(&headers, Some("xyz")).unwrap(), "abc");
    }

    #[test]
    fn cookie_then_query_are_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=cookie-tok"));
        assert_eq!(get_auth_token(&headers, None).unwrap(), "cookie-tok");

        let empty = HeaderMap::new();
        assert_eq!(get_auth_token(&empty, Some("query-tok")).unwrap(), "query-tok");
        assert!(get_auth_token(&empty, None).is_err());
        assert!(get_auth_token(&empty, Some("")).is_err());
    }

    #[test]
    fn valid_token_yields_identity() {
        let t = token(json!({"sub": "u1", "name": "Ada", "roles": ["admin"], "exp": exp()}));
        let auth = authenticate(&HeaderMap::new(), Some(&t), Some(SECRET)).unwrap();
        assert_eq!(auth.identity, Identity { user_id: "u1".into(), username: "Ada".into() });
        assert_eq!(auth.roles, vec!["admin".to_string()]);
        assert_eq!(auth.token_type, "user");
    }

    #[test]
    fn username_falls_back_to_subject() {
        let t = token(json!({"sub": "u1", "exp": exp()}));
        let auth = authenticate(&HeaderMap::new(), Some(&t), Some(SECRET)).unwrap();
        assert_eq!(auth.identity.username, "u1");
    }

    #[test]
    fn wrong_secret_missing_subject_or_secret_are_rejected() {
        let t = token(json!({"sub": "u1", "exp": exp()}));
        assert!(authenticate(&HeaderMap::new(), Some(&t), Some("other")).is_err());
        assert!(authenticate(&HeaderMap::new(), Some(&t), None).is_err());

        let anonymous = token(json!({"name": "nobody", "exp": exp()}));
        assert!(authenticate(&HeaderMap::new(), Some(&anonymous), Some(SECRET)).is_err());
    }
}
