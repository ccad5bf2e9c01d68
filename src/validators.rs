//! Reusable input validators for registration and delivery forms.

use serde::Serialize;

pub use crate::rut::validate as validate_rut;

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }

    // Needs some dot with non-empty text on both sides within the domain.
    domain
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .any(|(i, _)| i > 0 && i + 1 < domain.len())
}

/// Chilean phone number: 8 or 9 digits starting with 2-9, optional `+56`.
pub fn validate_phone(phone: &str) -> bool {
    let cleaned: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+')
        .collect();
    let local = cleaned.strip_prefix("56").unwrap_or(&cleaned);

    let mut chars = local.chars();
    match chars.next() {
        Some('2'..='9') => {}
        _ => return false,
    }
    let rest = chars.as_str();
    (7..=8).contains(&rest.len()) && rest.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCheck {
    pub valid: bool,
    pub message: &'static str,
    pub strength: PasswordStrength,
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Check minimum length and score password strength.
pub fn validate_password(password: &str) -> PasswordCheck {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return PasswordCheck {
            valid: false,
            message: "password must be at least 6 characters long",
            strength: PasswordStrength::Weak,
        };
    }

    let score = [
        password.chars().count() >= 8,
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_ascii_alphanumeric()),
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count();

    let strength = match score {
        0..=2 => PasswordStrength::Weak,
        3..=4 => PasswordStrength::Medium,
        _ => PasswordStrength::Strong,
    };

    PasswordCheck {
        valid: true,
        message: "password accepted",
        strength,
    }
}

/// Strip angle brackets and surrounding whitespace from free text.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn not_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
