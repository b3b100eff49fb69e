use subtle::ConstantTimeEq;

/// Constant-time string comparison for API keys
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme is matched case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Whether `header` carries exactly `expected` as its bearer token.
pub fn authorize_bearer(header: Option<&str>, expected: &str) -> bool {
    header
        .and_then(bearer_token)
        .is_some_and(|token| constant_time_compare(token, expected))
}
