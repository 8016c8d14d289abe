//! Fixed instructions sent alongside every media file.

use crate::models::MediaKind;

const SERVICE_EXAMPLES: &str = "junk removal, garage cleanout, landscaping, tree trimming, demolition";

/// Build the itemized prompt for one kind of media.
///
/// Images get an extra question asking which gallery placeholder the photo
/// should replace, listing `categories`.
pub fn caption_prompt(kind: MediaKind, categories: &[String]) -> String {
    let noun = kind.label();
    let mut lines = Vec::with_capacity(8);

    lines.push(format!("Analyze this {} and provide:", noun));
    match kind {
        MediaKind::Image => {
            lines.push(format!(
                "1. What type of service/job is shown? (e.g., {}, house cleanout, backyard cleanup, etc.)",
                SERVICE_EXAMPLES
            ));
            lines.push("2. Brief description of what's in the image".to_string());
        }
        MediaKind::Video => {
            lines.push(format!(
                "1. What type of service/job is shown? (e.g., {}, etc.)",
                SERVICE_EXAMPLES
            ));
            lines.push("2. Brief description of what's happening in the video".to_string());
        }
    }
    lines.push("3. Is this a \"before\" or \"after\" shot, or both?".to_string());
    lines.push(format!(
        "4. What makes this {} good for a business website gallery?",
        noun
    ));
    lines.push(format!("5. Suggested title/caption for this {}", noun));
    if kind == MediaKind::Image && !categories.is_empty() {
        lines.push(format!(
            "6. Which gallery placeholder should this replace? ({})",
            join_choices(categories)
        ));
    }
    lines.push(String::new());
    lines.push("Be concise and specific.".to_string());

    lines.join("\n")
}

/// `"A"`, `"A or B"`, `"A, B, or C"`.
fn join_choices(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} or {}", a, b),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    }
}
