use thiserror::Error;

/// Startup configuration problems. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Judge API key not found. Please set JUDGE_API_KEY or OPENAI_API_KEY environment variable."
    )]
    MissingJudgeKey,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Dataset loading failures. These abort the run before any evaluation.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in dataset file {path} (line {line}): {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dataset file {0} must contain a JSON array of records")]
    NotAnArray(String),

    #[error("Failed to fetch dataset rows: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dataset server returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failure of a single chat completion call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] async_openai::error::OpenAIError),

    #[error("Response contained no message content")]
    EmptyResponse,
}

/// Failure of a single judging step.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Judge response was not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Judge response has no integer score: {0}")]
    MissingScore(String),

    #[error("Judge score {0} is outside the 1-5 range")]
    ScoreOutOfRange(i64),
}
