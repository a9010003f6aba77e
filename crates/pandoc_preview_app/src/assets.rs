//! Embedded assets for the preview page.

/// HTML template with placeholders for CSS and JS.
pub const HTML_TEMPLATE: &str = include_str!("../assets/index.html");

/// Page styles.
pub const STYLES_CSS: &str = include_str!("../assets/styles.css");

/// Page logic: WebSocket wiring, scroll feedback, dialogs.
pub const PREVIEW_JS: &str = include_str!("../assets/preview.js");

/// Build the complete page with inlined CSS and JS.
pub fn page() -> String {
    HTML_TEMPLATE
        .replace("/*__STYLES_CSS__*/", STYLES_CSS)
        .replace("/*__PREVIEW_JS__*/", PREVIEW_JS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_exists() {
        assert!(HTML_TEMPLATE.contains("<!DOCTYPE html>"));
        assert!(!STYLES_CSS.is_empty());
        assert!(PREVIEW_JS.contains("WebSocket"));
    }

    #[test]
    fn test_page_inlines_everything() {
        let html = page();
        assert!(!html.contains("/*__STYLES_CSS__*/"));
        assert!(!html.contains("/*__PREVIEW_JS__*/"));
        assert!(html.contains("WebSocket"));
    }
}
