use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectiveError {
    #[error("Parse error in `{expression}`: {message}")]
    Parse { expression: String, message: String },
    #[error("`{0}` is not defined")]
    UndefinedVariable(String),
    #[error("Cannot assign to `{0}`: no scope defines it")]
    Assignment(String),
    #[error("Invalid for expression: `{0}`")]
    ForExpression(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DirectiveError>;

impl DirectiveError {
    pub(crate) fn parse(expression: &str, message: impl Into<String>) -> Self {
        Self::Parse { expression: expression.to_string(), message: message.into() }
    }
}
