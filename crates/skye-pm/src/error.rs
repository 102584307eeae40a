use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("render failed: {0}")]
    RenderError(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<minijinja::Error> for PmError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::TemplateNotFound => Self::TemplateNotFound(err.to_string()),
            minijinja::ErrorKind::SyntaxError => Self::InvalidTemplate(err.to_string()),
            _ => Self::RenderError(err.to_string()),
        }
    }
}
