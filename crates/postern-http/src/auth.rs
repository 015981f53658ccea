//! Admin authentication: HTTP Basic with the configured admin token.

use axum::extract::Request;
use axum::http::header;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use postern_types::Token;

/// Check a request's Basic credentials against the admin token.
///
/// The expected credentials are username `admin` with the token's 32-hex
/// form as the password. The token comparison is constant-time; the
/// username and the hex length/alphabet checks are not, which is fine
/// because both are public.
pub(crate) fn check_admin(request: &Request, admin_token: &Token) -> bool {
    let Some(header) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return false;
    };
    if user != "admin" {
        return false;
    }
    let Ok(token) = pass.parse::<Token>() else {
        return false;
    };
    token.ct_eq(admin_token)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/node/n1");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn test_accepts_correct_credentials() {
        let token = Token::random();
        let req = request_with_auth(Some(&basic("admin", &token.to_hex())));
        assert!(check_admin(&req, &token));
    }

    #[test]
    fn test_rejects_everything_else() {
        let token = Token::random();
        let other = Token::random();

        for value in [
            None,
            Some("Bearer deadbeef"),
            Some("Basic not-base64!!"),
            Some(basic("admin", "not-a-token").as_str()),
            Some(basic("admin", &other.to_hex()).as_str()),
            Some(basic("root", &token.to_hex()).as_str()),
        ] {
            let req = request_with_auth(value);
            assert!(!check_admin(&req, &token), "accepted {value:?}");
        }
    }
}
