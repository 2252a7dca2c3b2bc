//! System prompt construction and reply clean-up.

/// Preambles the model tends to open with. Spoken aloud they sound canned,
/// so they are removed from replies before synthesis.
pub const DEFAULT_STOCK_PHRASES: &[&str] = &[
    "Thank you for your response",
    "Thank you for your answer",
    "Thank you for sharing that",
    "Thank you for sharing",
    "Thanks for sharing",
    "That's a great answer",
    "That's a good answer",
    "Great answer",
    "Good answer",
    "Thank you",
    "Thanks",
];

/// What the interviewer is currently asking about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub question: String,
    pub expected_keywords: Vec<String>,
    pub follow_up: Option<String>,
}

pub fn build_system_prompt(ctx: &PromptContext) -> String {
    let mut prompt = String::from(
        "You are a professional technical interviewer conducting a spoken interview. \
         Reply in one or two short sentences suitable for text-to-speech. \
         Acknowledge the candidate's answer briefly or ask one clarifying follow-up. \
         Do not move on to a new topic and do not reveal the expected answer.",
    );

    prompt.push_str("\n\nCurrent question: ");
    prompt.push_str(ctx.question.trim());

    let keywords: Vec<&str> = ctx
        .expected_keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if !keywords.is_empty() {
        prompt.push_str("\nA strong answer mentions: ");
        prompt.push_str(&keywords.join(", "));
    }

    if let Some(follow_up) = ctx.follow_up.as_deref().map(str::trim) {
        if !follow_up.is_empty() {
            prompt.push_str("\nIf the answer is thin, follow up with: ");
            prompt.push_str(follow_up);
        }
    }

    prompt
}

/// Case-insensitive prefix match that only succeeds on a word boundary.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut rest = text;
    for expected in prefix.chars() {
        let mut chars = rest.chars();
        let actual = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
        rest = chars.as_str();
    }
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() => None,
        _ => Some(rest),
    }
}

fn trim_leading_punctuation(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | ':' | ';' | '-'))
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Remove leading stock phrases from `reply` and re-capitalize.
///
/// Phrases are matched case-insensitively, longest first, and repeatedly, so
/// "Thanks! Great answer. Why?" becomes "Why?". If nothing is left the
/// trimmed original is returned.
pub fn strip_stock_phrases<S: AsRef<str>>(reply: &str, phrases: &[S]) -> String {
    let mut ordered: Vec<&str> = phrases
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect();
    ordered.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));

    let mut rest = trim_leading_punctuation(reply);
    let mut stripped = false;
    'outer: loop {
        for phrase in &ordered {
            if let Some(after) = strip_prefix_ignore_case(rest, phrase) {
                rest = trim_leading_punctuation(after);
                stripped = true;
                continue 'outer;
            }
        }
        break;
    }

    let rest = rest.trim_end();
    if rest.is_empty() {
        return reply.trim().to_string();
    }
    if stripped {
        capitalize_first(rest)
    } else {
        rest.to_string()
    }
}
