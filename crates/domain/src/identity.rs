use serde::Serialize;

pub const ANONYMOUS: &str = "Anonymous";
pub const PLACEHOLDER_BADGE: char = '?';

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Joined profile name, then whatever the caller knows about the account
/// (usually its email), then "Anonymous".
pub fn resolve_display_name(joined: Option<&str>, fallback: Option<&str>) -> String {
    non_blank(joined)
        .or_else(|| non_blank(fallback))
        .unwrap_or(ANONYMOUS)
        .to_string()
}

pub fn badge(joined: Option<&str>, fallback: Option<&str>) -> char {
    non_blank(joined)
        .or_else(|| non_blank(fallback))
        .and_then(|name| name.chars().next())
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or(PLACEHOLDER_BADGE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorLabel {
    pub name: String,
    pub badge: char,
}

impl AuthorLabel {
    pub fn resolve(joined: Option<&str>, fallback: Option<&str>) -> Self {
        Self {
            name: resolve_display_name(joined, fallback),
            badge: badge(joined, fallback),
        }
    }
}
