use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
