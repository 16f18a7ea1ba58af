#[derive(Debug)]
pub enum Validity {
    Valid,
    Invalid(String),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        match &self {
            Validity::Valid => true,
            Validity::Invalid(_) => false,
        }
    }
}

pub fn validate_email_address(email: &str) -> Validity {
    if email.chars().count() > 320 {
        return Validity::Invalid(String::from("Email address is too long."));
    }

    for c in email.chars() {
        if c == ' ' || !c.is_ascii() {
            return Validity::Invalid(String::from("Email address cannot contain a space."));
        }
    }

    if email.contains("@.") {
        return Validity::Invalid(String::from(
            "Domain name in email address cannot begin with a period.",
        ));
    }

    let email = match email.split_once('@') {
        Some(s) => s,
        None => {
            return Validity::Invalid(String::from("Email address must contain an at symbol (@)."))
        }
    };

    if email.0.is_empty() || email.1.len() < 3 {
        return Validity::Invalid(String::from("Email username or domain name is to short."));
    }

    if email.1.contains('@') || !email.1.contains('.') {
        return Validity::Invalid(String::from(
            "Email address must have only one at symbol (@) and the domain must contain a period.",
        ));
    }

    if email.1.ends_with('.') {
        return Validity::Invalid(String::from("Email address cannot end with a period."));
    }

    Validity::Valid
}

/// Whether a login identifier should be looked up by email rather than by
/// username.
pub fn is_email_address(identifier: &str) -> bool {
    validate_email_address(identifier).is_valid()
}

pub fn validate_username(username: &str) -> Validity {
    if username.len() < 5 || username.len() > 120 {
        return Validity::Invalid(String::from(
            "Username length should be between 5 to 120",
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Validity::Invalid(String::from(
            "Username must contain only letters, numbers, and underscores.",
        ));
    }

    Validity::Valid
}

pub fn validate_password_strength(password: &str) -> Validity {
    const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

    if password != password.trim() {
        return Validity::Invalid(String::from(
            "Password must not contain leading or trailing whitespace.",
        ));
    }

    if password.len() < 8 {
        return Validity::Invalid(String::from(
            "Password must be at least 8 characters long.",
        ));
    }

    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Validity::Invalid(String::from("Password must contain at least one letter."));
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Validity::Invalid(String::from("Password must contain at least one digit."));
    }

    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Validity::Invalid(String::from(
            "Password must contain at least one special character.",
        ));
    }

    Validity::Valid
}

/// Collapses runs of whitespace, dashes, and underscores into single spaces,
/// strips any other non-alphanumeric characters, lowercases everything, then
/// capitalizes the first word only.
pub fn normalize_category_name(name: &str) -> String {
    let lowered = name.to_lowercase();

    let mut collapsed = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.trim().chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_space = true;
        } else if c.is_alphanumeric() {
            if pending_space && !collapsed.is_empty() {
                collapsed.push(' ');
            }
            pending_space = false;
            collapsed.push(c);
        }
        // Remaining punctuation is dropped without acting as a separator
    }

    let mut words = collapsed.split(' ');

    let Some(first) = words.next() else {
        return String::new();
    };

    let mut first_chars = first.chars();
    let mut normalized = match first_chars.next() {
        Some(c) => {
            let mut capitalized = c.to_uppercase().collect::<String>();
            capitalized.push_str(first_chars.as_str());
            capitalized
        }
        None => return String::new(),
    };

    for word in words {
        normalized.push(' ');
        normalized.push_str(word);
    }

    normalized
}
