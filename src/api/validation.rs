use super::ApiError;
use crate::domain::ContentType;

pub fn validate_limit(limit: u64) -> Result<u64, ApiError> {
    const MAX_LIMIT: u64 = 1000;
    const MIN_LIMIT: u64 = 1;

    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::validation(format!(
            "Invalid limit: {}. Limit must be between {} and {}",
            limit, MIN_LIMIT, MAX_LIMIT
        )));
    }
    Ok(limit)
}

/// Parses an optional `contentType` filter; an empty value means no filter.
pub fn parse_content_type(raw: Option<&str>) -> Result<Option<ContentType>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(ApiError::validation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_bounds() {
        assert!(validate_limit(0).is_err());
        assert_eq!(validate_limit(1).unwrap(), 1);
        assert_eq!(validate_limit(1000).unwrap(), 1000);
        assert!(validate_limit(1001).is_err());
    }

    #[test]
    fn content_type_filter() {
        assert_eq!(parse_content_type(None).unwrap(), None);
        assert_eq!(parse_content_type(Some("")).unwrap(), None);
        assert_eq!(
            parse_content_type(Some("Manga")).unwrap(),
            Some(ContentType::Manga)
        );
        assert!(parse_content_type(Some("novel")).is_err());
    }
}
