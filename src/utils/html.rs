use ammonia;

/// Clean free-text remarks using the ammonia library.
///
/// Remarks entered in the back-office are rendered on result sheets and in the
/// public checker, so markup is reduced to a whitelist of safe tags (like
/// <b>, <p>) while <script>, <iframe> and event-handler attributes are dropped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes an optional remark, keeping `None` as `None`.
pub fn clean_optional(input: Option<String>) -> Option<String> {
    input.map(|text| clean_html(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_script() {
        let cleaned = clean_html("<b>Good</b> effort<script>alert(1)</script>");
        assert_eq!(cleaned, "<b>Good</b> effort");
    }

    #[test]
    fn test_optional_passthrough() {
        assert_eq!(clean_optional(None), None);
        assert_eq!(clean_optional(Some("Keep it up".to_string())).as_deref(), Some("Keep it up"));
    }
}
