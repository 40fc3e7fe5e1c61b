//! Unsigned JWTs for tests.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;

const HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

/// Compact JWT with the given `exp` and `sub` claims and a dummy signature.
///
/// Distinct subjects give distinct tokens, which lets tests tell which
/// credential a socket was opened with.
pub fn mint_token(exp: u64, subject: &str) -> String {
    let payload = json!({ "exp": exp, "sub": subject }).to_string();
    format!("{HEADER}.{}.c2lnbmF0dXJl", URL_SAFE_NO_PAD.encode(payload))
}

#[cfg(test)]
mod tests {
    use tether_core::TokenClaims;

    use super::*;

    #[test]
    fn minted_tokens_decode() {
        let claims = TokenClaims::decode(&mint_token(42, "access-1")).unwrap();
        assert_eq!(claims.exp, 42);
        assert_eq!(claims.sub.as_deref(), Some("access-1"));
    }
}
