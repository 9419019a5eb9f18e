//! Token estimation utilities

/// Default characters per token for mixed English prose
pub const DEFAULT_CHARS_PER_TOKEN: f32 = 4.0;

/// Character-count heuristic for token usage
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f32,
}

impl TokenEstimator {
    pub fn new(chars_per_token: f32) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    /// Estimate token count for text
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();
        (char_count as f32 / self.chars_per_token).ceil() as usize
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_based_estimation() {
        let estimator = TokenEstimator::default();

        assert_eq!(estimator.estimate("Hello world"), 3); // 11 chars / 4 = 2.75 -> 3
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abcd"), 1);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let estimator = TokenEstimator::new(2.0);
        assert_eq!(estimator.estimate("éééé"), 2);
    }

    #[test]
    fn test_invalid_ratio_falls_back() {
        let estimator = TokenEstimator::new(0.0);
        assert_eq!(estimator.estimate("12345678"), 2);
    }
}
