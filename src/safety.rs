//! Crisis-language gate that runs before every generation call.
//!
//! The check is a plain case-insensitive substring scan over a fixed phrase
//! list. A hit returns [`SAFETY_MESSAGE`], a hardcoded referral that is shown
//! instead of any model output.

/// Phrases that route a message to the safety referral.
pub const CRISIS_PHRASES: &[&str] = &[
    "suicide",
    "kill myself",
    "want to die",
    "depression",
    "depressed",
    "panic attack",
    "anxiety",
    "can't take it anymore",
    "hopeless",
];

/// Fixed, human-written referral returned on a crisis match.
pub const SAFETY_MESSAGE: &str = "\
I am concerned about what you're sharing.

Please know that you are not alone. As an AI, I cannot provide the support you need right now, but there are people who can.

Campus Counseling Center: (555) 010-2020 (Open 24/7)
National Crisis Lifeline: call or text 988

Please reach out to one of these resources immediately. Your well-being is the most important thing.";

/// Returns the safety referral if `message` contains a crisis phrase, `None` otherwise.
pub fn check(message: &str) -> Option<&'static str> {
    let normalized = message.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    CRISIS_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
        .then_some(SAFETY_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_in_any_casing() {
        for msg in [
            "I feel HOPELESS about this exam",
            "honestly i want to die",
            "Panic Attack before every quiz",
            "Is DEPRESSION covered in psych 101?",
        ] {
            assert_eq!(check(msg), Some(SAFETY_MESSAGE), "missed: {}", msg);
        }
    }

    #[test]
    fn curly_apostrophe_still_matches() {
        assert!(check("I can\u{2019}t take it anymore").is_some());
    }

    #[test]
    fn ordinary_questions_pass() {
        assert_eq!(check("Explain the chain rule step by step"), None);
        assert_eq!(check(""), None);
    }

    #[test]
    fn message_names_crisis_resources() {
        assert!(SAFETY_MESSAGE.contains("988"));
        assert!(SAFETY_MESSAGE.contains("Counseling"));
    }
}
