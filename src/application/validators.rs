use validator::ValidateEmail;

/// Validates that the input looks like a valid email address
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.validate_email()
}

/// License keys and instance ids are opaque provider tokens:
/// 1-255 visible ASCII characters, no whitespace.
pub fn is_valid_license_token(token: &str) -> bool {
    !token.is_empty() && token.len() <= 255 && token.chars().all(|c| c.is_ascii_graphic())
}
