use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanApplyError {
    #[error("PlanDefinition not found: {reference}")]
    PlanNotFound { reference: String },

    #[error("Invalid resource: expected {expected}, got {got}")]
    InvalidResource { expected: String, got: String },

    #[error("Unknown action definition: {reference} (resource type {kind})")]
    UnknownDefinitionKind { reference: String, kind: String },

    #[error("Action definition could not be resolved: {reference}")]
    UnresolvedDefinition { reference: String },

    #[error("Parameter not found: {name}")]
    MissingParameter { name: String },

    #[error("Required extension for {url} not found")]
    MissingExtension { url: String },

    #[error("PlanDefinition {canonical} references itself through nested actions")]
    RecursivePlan { canonical: String },

    #[error("Nested PlanDefinition depth {depth} exceeds the limit of {limit}")]
    NestingDepthExceeded { depth: usize, limit: usize },

    #[error("Expression {expression} failed: {message}")]
    Evaluation { expression: String, message: String },

    #[error("ActivityDefinition could not be applied: {message}")]
    ActivityApplication { message: String },

    #[error("No {0} is configured")]
    MissingCollaborator(&'static str),

    #[error("Questionnaire package error: {message}")]
    Package { message: String },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid path {path}: {message}")]
    InvalidPath { path: String, message: String },

    #[error("HTTP request error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, PlanApplyError>;

impl PlanApplyError {
    pub fn plan_not_found<S: Into<String>>(reference: S) -> Self {
        Self::PlanNotFound {
            reference: reference.into(),
        }
    }

    pub fn invalid_resource<S: Into<String>>(expected: S, got: S) -> Self {
        Self::InvalidResource {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn unknown_definition_kind<S: Into<String>>(reference: S, kind: S) -> Self {
        Self::UnknownDefinitionKind {
            reference: reference.into(),
            kind: kind.into(),
        }
    }

    pub fn unresolved_definition<S: Into<String>>(reference: S) -> Self {
        Self::UnresolvedDefinition {
            reference: reference.into(),
        }
    }

    pub fn missing_parameter<S: Into<String>>(name: S) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    pub fn missing_extension<S: Into<String>>(url: S) -> Self {
        Self::MissingExtension { url: url.into() }
    }

    pub fn recursive_plan<S: Into<String>>(canonical: S) -> Self {
        Self::RecursivePlan {
            canonical: canonical.into(),
        }
    }

    pub fn evaluation<S: Into<String>>(expression: S, message: S) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn activity_application<S: Into<String>>(message: S) -> Self {
        Self::ActivityApplication {
            message: message.into(),
        }
    }

    pub fn package<S: Into<String>>(message: S) -> Self {
        Self::Package {
            message: message.into(),
        }
    }

    pub fn invalid_path<S: Into<String>>(path: S, message: S) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn http_error<S: Into<String>>(message: S) -> Self {
        Self::Http(message.into())
    }

    /// Structural failures abort the action being resolved and propagate to
    /// its caller; every other error is caught where the delegate was invoked.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::PlanNotFound { .. }
                | Self::UnknownDefinitionKind { .. }
                | Self::UnresolvedDefinition { .. }
                | Self::MissingParameter { .. }
                | Self::MissingExtension { .. }
        )
    }
}
