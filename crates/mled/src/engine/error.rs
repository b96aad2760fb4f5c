use crate::pattern::PatternError;
use crate::proto::ProtoError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid multicast group: {0}")]
    InvalidGroup(String),
    #[error("invalid bind ip: {0}")]
    InvalidBindIp(String),
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("no multicast-capable IPv4 interface found")]
    NoMulticastInterface,
    #[error("engine already running")]
    AlreadyRunning,
    #[error("engine not running")]
    NotRunning,
    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
