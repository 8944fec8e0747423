use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("network error: {0}")]
    Net(#[from] vc_net::NetError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
