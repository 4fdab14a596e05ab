//! Field rules applied before anything reaches the store.

use super::DomainError;

pub const USERNAME_MAX_LEN: usize = 150;
pub const SLUG_MAX_LEN: usize = 40;
pub const GROUP_TITLE_MAX_LEN: usize = 200;

/// Trims surrounding whitespace; blank input is rejected with `field` named in the message.
pub fn clean_text(field: &str, raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Letters, digits and `@ . + - _`, at most 150 characters.
pub fn clean_username(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > USERNAME_MAX_LEN {
        return Err(DomainError::Validation(format!(
            "username must be 1 to {USERNAME_MAX_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(DomainError::Validation(format!(
            "username {name:?} may contain only letters, digits and @/./+/-/_"
        )));
    }
    Ok(name.to_string())
}

/// ASCII letters, digits, hyphens and underscores, at most 40 characters.
pub fn clean_slug(raw: &str) -> Result<String, DomainError> {
    let slug = raw.trim();
    if slug.is_empty() || slug.len() > SLUG_MAX_LEN {
        return Err(DomainError::Validation(format!(
            "slug must be 1 to {SLUG_MAX_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DomainError::Validation(format!(
            "slug {slug:?} may contain only latin letters, digits, hyphens and underscores"
        )));
    }
    Ok(slug.to_string())
}

pub fn clean_group_title(raw: &str) -> Result<String, DomainError> {
    let title = clean_text("title", raw)?;
    if title.chars().count() > GROUP_TITLE_MAX_LEN {
        return Err(DomainError::Validation(format!(
            "title must be at most {GROUP_TITLE_MAX_LEN} characters"
        )));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_trims_and_rejects_blank() {
        assert_eq!(clean_text("text", "  hello \n").unwrap(), "hello");
        assert!(matches!(
            clean_text("text", " \t\n"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(clean_username("leo.t+1@x_y-z").unwrap(), "leo.t+1@x_y-z");
        assert_eq!(clean_username("Тестовый").unwrap(), "Тестовый");
        assert!(clean_username("with space").is_err());
        assert!(clean_username("").is_err());
        assert!(clean_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn test_slug_rules() {
        assert_eq!(clean_slug("test-group_1").unwrap(), "test-group_1");
        assert!(clean_slug("news/today").is_err());
        assert!(clean_slug("новости").is_err());
        assert!(clean_slug(&"s".repeat(41)).is_err());
    }
}
