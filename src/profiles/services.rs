use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use super::dto::RegisterRequest;
use super::repo_types::ProfileInput;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all required fields. Missing: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Experience cannot be negative")]
    NegativeExperience,
    #[error("Experience cannot exceed {} years", MAX_EXPERIENCE_YEARS)]
    ExperienceTooLarge,
}

pub const MAX_EXPERIENCE_YEARS: u32 = 100;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Caller-side checks before a record reaches the store.
pub fn validate(req: RegisterRequest) -> Result<ProfileInput, ValidationError> {
    let required = [
        ("name", req.name.trim()),
        ("email", req.email.trim()),
        ("phone", req.phone.trim()),
        ("profession", req.profession.trim()),
        ("skills", req.skills.trim()),
    ];
    let missing: Vec<&'static str> = required
        .iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ValidationError::InvalidEmail);
    }

    let experience = match req.experience {
        Some(n) if n < 0 => return Err(ValidationError::NegativeExperience),
        Some(n) => match u32::try_from(n) {
            Ok(years) if years <= MAX_EXPERIENCE_YEARS => Some(years),
            _ => return Err(ValidationError::ExperienceTooLarge),
        },
        None => None,
    };

    Ok(ProfileInput {
        name: req.name.trim().to_string(),
        email,
        phone: req.phone.trim().to_string(),
        profession: req.profession.trim().to_string(),
        organization: non_blank(req.organization),
        skills: req.skills.trim().to_string(),
        experience,
        bio: non_blank(req.bio),
    })
}
