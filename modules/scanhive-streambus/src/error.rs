use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamBusError {
    #[error("stream bus unreachable: {0}")]
    Infrastructure(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<redis::RedisError> for StreamBusError {
    fn from(err: redis::RedisError) -> Self {
        StreamBusError::Infrastructure(err.to_string())
    }
}
