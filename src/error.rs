use thiserror::Error;

/// Errors surfaced by the ingestion pipeline.
///
/// League-level failures are contained by the orchestrator and reported as
/// structured outcome data; nothing here crosses the run boundary except a
/// missing API key or database, which abort the whole run at startup.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported league: {0}")]
    UnsupportedLeague(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Provider {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed event payload: {0}")]
    Transform(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
