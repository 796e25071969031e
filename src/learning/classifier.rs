use crate::domain::ErrorType;

/// Vocabularies in match order. The first category with a hit wins, so
/// "connection timed out" is a performance problem, not a network one.
const VOCABULARIES: &[(ErrorType, &[&str])] = &[
    (
        ErrorType::Performance,
        &[
            "timeout",
            "timed out",
            "deadline exceeded",
            "rate limit",
            "too many requests",
            "too slow",
            "latency",
        ],
    ),
    (
        ErrorType::Network,
        &[
            "connection",
            "network",
            "dns",
            "refused",
            "unreachable",
            "socket",
            "eof",
            "reset by peer",
            "no such host",
            "tls",
        ],
    ),
    (
        ErrorType::Configuration,
        &[
            "config",
            "not configured",
            "api key",
            "credential",
            "unauthorized",
            "forbidden",
            "permission denied",
            "environment variable",
        ],
    ),
    (
        ErrorType::Validation,
        &[
            "invalid",
            "validation",
            "required",
            "missing",
            "malformed",
            "parse",
            "must be",
            "bad request",
            "schema",
        ],
    ),
    (
        ErrorType::Logic,
        &[
            "panic",
            "null",
            "nil",
            "index out of",
            "overflow",
            "assertion",
            "unexpected",
            "unreachable code",
            "not implemented",
        ],
    ),
];

/// Deterministic keyword classification of an error message.
pub fn classify_error(message: &str) -> ErrorType {
    let lowered = message.to_lowercase();
    VOCABULARIES
        .iter()
        .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_category() {
        assert_eq!(classify_error("request timeout after 30s"), ErrorType::Performance);
        assert_eq!(classify_error("Connection refused"), ErrorType::Network);
        assert_eq!(classify_error("API key not set"), ErrorType::Configuration);
        assert_eq!(classify_error("field 'id' is required"), ErrorType::Validation);
        assert_eq!(classify_error("index out of bounds"), ErrorType::Logic);
        assert_eq!(classify_error("something odd happened"), ErrorType::Unknown);
    }

    #[test]
    fn test_first_category_wins() {
        assert_eq!(classify_error("connection timed out"), ErrorType::Performance);
        assert_eq!(classify_error("invalid config file"), ErrorType::Configuration);
    }

    #[test]
    fn test_classification_is_stable() {
        let message = "Upstream returned 429: Too Many Requests";
        let first = classify_error(message);
        let second = classify_error(message);
        assert_eq!(first, second);
        assert_eq!(first, ErrorType::Performance);
    }
}
