use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("election error: {0}")]
    Election(#[from] fedvote_consensus::ElectionError),

    #[error("malformed election message: {0}")]
    Codec(#[from] fedvote_messages::CodecError),

    #[error("wire envelope error: {0}")]
    Wire(#[from] bincode::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("service channel closed")]
    ChannelClosed,
}
