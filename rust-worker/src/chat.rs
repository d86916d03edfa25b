//! Rule-based chat responder for the public site widget.
//!
//! A pure keyword match from visitor text to a canned answer; first
//! matching rule wins, with a generic fallback.

/// Pick a response for the visitor's message.
pub fn respond(input: &str) -> &'static str {
    let text = input.to_lowercase();

    if contains_any(&text, &["price", "cost", "how much", "fee"]) {
        "Membership pricing depends on the plan you pick - the savings \
         calculator on our site shows what you'd pay and save based on how \
         you travel today."
    } else if contains_any(&text, &["destination", "where", "resort", "country"]) {
        "Members book stays at thousands of resorts worldwide - beach, city, \
         and mountain destinations across every continent."
    } else if contains_any(&text, &["ambassador", "refer", "affiliate", "earn"]) {
        "Ambassadors get their own funnel page and can earn by sharing the \
         membership. Apply through the Get Started form and we'll follow up."
    } else if contains_any(&text, &["how", "work", "membership"]) {
        "The membership gives you access to wholesale travel pricing. Watch \
         the short video on our home page for the full walkthrough."
    } else {
        "Thanks for reaching out! Leave your details in the Get Started form \
         and we'll get back to you with answers."
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_keywords() {
        assert!(respond("How much does it cost?").contains("pricing"));
        assert!(respond("what's the FEE").contains("pricing"));
    }

    #[test]
    fn test_destination_keywords() {
        assert!(respond("Where can I travel?").contains("resorts"));
    }

    #[test]
    fn test_ambassador_keywords() {
        assert!(respond("can I earn as a referrer").contains("Ambassadors"));
    }

    #[test]
    fn test_fallback() {
        assert!(respond("asdf qwerty").contains("Get Started"));
    }

    #[test]
    fn test_first_match_wins() {
        // "price" outranks "how ... work".
        assert!(respond("how does the price work").contains("pricing"));
    }
}
