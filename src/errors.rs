use std::fmt;

/// Invalid or missing configuration. Raised at startup or on first use and
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// An argument expression template that does not compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionError {
    pub name: String,
    pub template: String,
    pub reason: String,
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid expression for argument `{}` ({}): {}",
            self.name, self.template, self.reason
        )
    }
}

impl std::error::Error for ExpressionError {}

/// An argument expression failed against one message's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to evaluate argument `{}`: {}",
            self.name, self.reason
        )
    }
}

impl std::error::Error for EvaluationError {}
