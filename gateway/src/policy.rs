//! Completion policy: persona, reply language and length cap.
//!
//! The gateway, not the client, decides how the assistant speaks. Replies
//! are clamped to a word budget so TTS latency stays predictable, and an
//! empty transcript gets a fixed fallback instead of a backend round trip.

#[derive(Clone, Debug)]
pub struct CompletionPolicy {
    /// System prompt fragment describing who the assistant is.
    pub persona: String,
    /// Language the assistant answers in.
    pub language: String,
    /// Hard word cap applied to the backend's reply.
    pub max_reply_words: usize,
    /// Spoken when the transcript is empty or whitespace.
    pub fallback_reply: String,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        let persona = std::env::var("POLICY_PERSONA").unwrap_or_else(|_| {
            "You are Anwana, a warm and concise voice assistant.".to_string()
        });
        let language = std::env::var("POLICY_LANGUAGE").unwrap_or_else(|_| "English".to_string());
        let max_reply_words = std::env::var("POLICY_MAX_REPLY_WORDS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(60);
        let fallback_reply = std::env::var("POLICY_FALLBACK_REPLY")
            .unwrap_or_else(|_| "I didn't catch that, please come again.".to_string());
        Self {
            persona,
            language,
            max_reply_words,
            fallback_reply,
        }
    }
}

impl CompletionPolicy {
    /// Full system prompt handed to the completion backend.
    pub fn system_prompt(&self) -> String {
        format!(
            "{} Answer in {} and keep replies under {} words.",
            self.persona, self.language, self.max_reply_words
        )
    }
}

/// Truncate to at most `max_words` whitespace-separated words. The backend
/// is asked to stay under the budget, this enforces it.
pub fn clamp_words(text: &str, max_words: usize) -> String {
    let mut words = text.split_whitespace();
    let clamped: Vec<&str> = words.by_ref().take(max_words).collect();
    clamped.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reply_is_untouched() {
        assert_eq!(clamp_words("two words", 60), "two words");
    }

    #[test]
    fn long_reply_is_cut_at_the_budget() {
        let long = "a ".repeat(100);
        let clamped = clamp_words(&long, 10);
        assert_eq!(clamped.split_whitespace().count(), 10);
    }

    #[test]
    fn clamping_normalizes_whitespace_only() {
        assert_eq!(clamp_words("  spaced    out  ", 60), "spaced out");
    }

    #[test]
    fn system_prompt_carries_language_and_budget() {
        let policy = CompletionPolicy {
            persona: "You are a test.".into(),
            language: "French".into(),
            max_reply_words: 25,
            fallback_reply: String::new(),
        };
        let prompt = policy.system_prompt();
        assert!(prompt.contains("French"));
        assert!(prompt.contains("25 words"));
    }
}
