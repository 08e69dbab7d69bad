//! CLI-level error type, generalized from the teacher's `mofa-cli::error::CliError`
//! down to a plain `thiserror` enum — this crate has no `error-stack` reporting
//! story to preserve, so the simpler shape `orgkernel::CoreError` already uses
//! is the faithful one here.

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("role '{0}' not found")]
    RoleNotFound(String),

    #[error(transparent)]
    Core(#[from] orgkernel::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = std::result::Result<T, CliError>;
