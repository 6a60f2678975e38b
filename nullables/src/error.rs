use thiserror::Error;

#[derive(Debug, Error)]
pub enum NullEngineError {
    #[error("config error: {0}")]
    Config(String),
}
