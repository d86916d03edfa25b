//! Template rendering for sequence emails.
//!
//! Templates use `{{name}}` placeholders in both subject and body. Every
//! outbound sequence email gets the shared footer with the unsubscribe
//! link appended before the closing body tag.

use crate::token::encode_token;

/// Substitute `{{key}}` placeholders. Unknown placeholders are left in
/// place; values for keys the content never mentions are ignored.
pub fn render(content: &str, variables: &[(&str, &str)]) -> String {
    let mut result = content.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{{{key}}}}}"), value);
    }
    result
}

/// Build the unsubscribe link for `email`.
pub fn unsubscribe_link(site_url: &str, email: &str, signing_key: Option<&str>) -> String {
    format!(
        "{}/unsubscribe?token={}",
        site_url.trim_end_matches('/'),
        encode_token(email, signing_key)
    )
}

/// Append the list footer, inserting before `</body>` when present.
pub fn append_footer(html: &str, site_url: &str, email: &str, signing_key: Option<&str>) -> String {
    let link = unsubscribe_link(site_url, email, signing_key);
    let site = site_url.trim_end_matches('/');
    let footer = format!(
        r#"<div style="margin-top: 40px; padding-top: 20px; border-top: 1px solid #eee; text-align: center; color: #666; font-size: 12px;">
  <p>You're receiving this because you signed up at {site}</p>
  <p><a href="{link}" style="color: #666;">Unsubscribe</a> | <a href="{site}/privacy" style="color: #666;">Privacy Policy</a></p>
</div>"#
    );

    if let Some(idx) = html.find("</body>") {
        let mut out = String::with_capacity(html.len() + footer.len());
        out.push_str(&html[..idx]);
        out.push_str(&footer);
        out.push_str(&html[idx..]);
        out
    } else {
        format!("{html}{footer}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_occurrences() {
        let out = render(
            "Hi {{first_name}}, welcome {{first_name}}!",
            &[("first_name", "Pat")],
        );
        assert_eq!(out, "Hi Pat, welcome Pat!");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let out = render("Visit {{site_url}} {{mystery}}", &[("site_url", "https://a.example")]);
        assert_eq!(out, "Visit https://a.example {{mystery}}");
    }

    #[test]
    fn test_footer_inserted_before_body_close() {
        let html = "<html><body><p>Hello</p></body></html>";
        let out = append_footer(html, "https://a.example", "pat@example.com", None);
        let footer_at = out.find("Unsubscribe").unwrap();
        let body_close_at = out.rfind("</body>").unwrap();
        assert!(footer_at < body_close_at);
        assert!(out.contains("/unsubscribe?token="));
    }

    #[test]
    fn test_footer_appended_without_body_tag() {
        let out = append_footer("<p>Hello</p>", "https://a.example", "pat@example.com", None);
        assert!(out.starts_with("<p>Hello</p>"));
        assert!(out.contains("Unsubscribe"));
    }

    #[test]
    fn test_unsubscribe_link_strips_trailing_slash() {
        let link = unsubscribe_link("https://a.example/", "pat@example.com", None);
        assert!(link.starts_with("https://a.example/unsubscribe?token="));
    }
}
