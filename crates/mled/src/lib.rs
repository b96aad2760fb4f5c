pub mod engine;
pub mod node;
pub mod pattern;
pub mod proto;
pub mod time;

pub use engine::{
    ApplyRequest, ApplyResult, Engine, EngineConfig, EngineError, EngineEvent, EngineState,
    Interface, NetworkStats, Settings, Targets,
};
pub use node::{NodeDto, NodeStatus, format_node_id, parse_node_id};
pub use pattern::{PatternError, PatternSpec, Preset, build_wire_pattern};
pub use proto::{
    DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT, Header, MessageType, PatternConfig,
    PatternType, ProtoError, TargetMode,
};
pub use time::ShowClock;
