//! Deterministic organization naming for "authenticate, else create" sign-in.
//!
//! The same email must always map to the same organization slug, otherwise a
//! returning user would be sent down the signup branch and get a second
//! workspace.

/// Suffix appended to every derived organization slug.
pub const SLUG_SUFFIX: &str = "-workspace";

/// The part of an email address before the first `@` (the whole input when
/// there is none).
pub fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Organization slug for an email: the lowercased local part with every
/// character outside `[a-z0-9]` replaced by `-`, suffixed with `-workspace`.
pub fn org_slug(email: &str) -> String {
    let mut slug: String = local_part(email.trim())
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    slug.push_str(SLUG_SUFFIX);
    slug
}

/// Display name used when the identity provider gave us none.
pub fn default_name(email: &str) -> String {
    local_part(email.trim()).to_string()
}

/// Organization name for a new signup: `"{name}'s Workspace"`.
pub fn workspace_name(full_name: &str) -> String {
    format!("{full_name}'s Workspace")
}
