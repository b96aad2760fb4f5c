use mled::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

pub fn describe(event: &EngineEvent) -> LogEntry {
    match event {
        EngineEvent::NodeUpdate(node) => LogEntry::new(
            LogLevel::Info,
            format!(
                "{} {} ({}) rssi {} dBm, {}",
                node.node_id,
                node.name,
                node.ip,
                node.rssi,
                node.status.as_str()
            ),
        ),
        EngineEvent::NodeOffline { node_id } => {
            LogEntry::new(LogLevel::Warn, format!("{} went offline", node_id))
        }
        EngineEvent::ApplyAck { node_id, success } => {
            if *success {
                LogEntry::new(LogLevel::Info, format!("{} acknowledged cue", node_id))
            } else {
                LogEntry::new(LogLevel::Warn, format!("{} rejected cue", node_id))
            }
        }
        EngineEvent::Error { message } => LogEntry::new(LogLevel::Error, message.clone()),
    }
}

/// Routes an engine event to the `log` facade at the matching level.
pub fn log_event(event: &EngineEvent) {
    let entry = describe(event);
    match entry.level {
        LogLevel::Info => log::info!("[{}] {}", event.kind(), entry.message),
        LogLevel::Warn => log::warn!("[{}] {}", event.kind(), entry.message),
        LogLevel::Error => log::error!("[{}] {}", event.kind(), entry.message),
    }
}
