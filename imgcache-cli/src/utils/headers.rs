use tracing::warn;

/// Split a header string in format "Name: Value"
pub fn parse_header(header_str: &str) -> Option<(&str, &str)> {
    // Find the first colon which separates name and value
    let Some((name, value)) = header_str.split_once(':') else {
        warn!(
            "Invalid header format: '{}'. Expected 'Name: Value'",
            header_str
        );
        return None;
    };

    let name = name.trim();
    if name.is_empty() {
        warn!("Invalid header name in '{}'", header_str);
        return None;
    }

    Some((name, value.trim()))
}

/// Parse a collection of header strings, skipping malformed ones
pub fn parse_headers(header_strings: &[String]) -> Vec<(&str, &str)> {
    header_strings
        .iter()
        .filter_map(|header_str| parse_header(header_str))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Referer: https://example.com/a"),
            Some(("Referer", "https://example.com/a"))
        );
        assert_eq!(parse_header("X-Empty:"), Some(("X-Empty", "")));
        assert_eq!(parse_header("no colon"), None);
        assert_eq!(parse_header(" : value"), None);
    }

    #[test]
    fn test_parse_headers_skips_invalid() {
        let raw = vec!["A: 1".to_string(), "broken".to_string(), "B:2".to_string()];
        assert_eq!(parse_headers(&raw), vec![("A", "1"), ("B", "2")]);
    }
}
