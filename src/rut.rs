//! Chilean RUT (Rol Único Tributario) validation and display formatting.
//!
//! A RUT is a numeric body followed by one check character (`0`-`9` or `K`).
//! The check character is derived from the body with the module-11 weighted
//! sum, so `validate` never needs any external state.

/// Remove `.` and `-` separators and surrounding whitespace.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| *c != '.' && *c != '-')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Compute the check character for a RUT body made of ASCII digits.
///
/// Returns `None` when the body is empty or contains anything but digits.
pub fn check_character(body: &str) -> Option<char> {
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut sum: u64 = 0;
    let mut weight: u64 = 2;
    for digit in body.bytes().rev().map(|b| u64::from(b - b'0')) {
        sum += digit * weight;
        weight = if weight < 7 { weight + 1 } else { 2 };
    }

    Some(match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        n => char::from(b'0' + n as u8),
    })
}

/// Validate a RUT written with or without `.`/`-` punctuation.
///
/// Malformed input yields `false`; this never panics.
pub fn validate(input: &str) -> bool {
    let rut = normalize(input);
    let mut chars = rut.chars();
    let Some(check) = chars.next_back() else {
        return false;
    };
    let body = chars.as_str();
    if body.is_empty() {
        return false;
    }

    match check_character(body) {
        Some(expected) => check.to_ascii_uppercase() == expected,
        None => false,
    }
}

/// Produce the punctuated display form, e.g. `12345678k` → `12.345.678-k`.
///
/// Does not validate and keeps the trailing character's case as typed.
/// Inputs of at most one character after normalization are returned as-is.
pub fn format(input: &str) -> String {
    let rut = normalize(input);
    let chars: Vec<char> = rut.chars().collect();
    if chars.len() <= 1 {
        return rut;
    }

    let (body, check) = chars.split_at(chars.len() - 1);
    format!("{}-{}", group_thousands(body), check[0])
}

/// Insert `.` every three digits, counted from the right end of each digit run.
fn group_thousands(body: &[char]) -> String {
    // digits_ahead[i]: length of the digit run starting at i, or 0.
    let mut digits_ahead = vec![0usize; body.len() + 1];
    for i in (0..body.len()).rev() {
        if body[i].is_ascii_digit() {
            digits_ahead[i] = digits_ahead[i + 1] + 1;
        }
    }

    let mut out = String::with_capacity(body.len() + body.len() / 3);
    for (i, c) in body.iter().enumerate() {
        let run = digits_ahead[i];
        let prev_is_word = i > 0 && (body[i - 1].is_ascii_alphanumeric() || body[i - 1] == '_');
        if prev_is_word && run > 0 && run % 3 == 0 {
            out.push('.');
        }
        out.push(*c);
    }
    out
}
