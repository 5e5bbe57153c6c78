use std::fmt;

/// Errors surfaced to the host by the runtime.
///
/// Script-level failures inside dispatch loops are logged, not returned; these
/// are the conditions a host has to react to.
#[derive(Debug)]
pub enum RuntimeError {
    /// Bootstrap source missing, unparsable, or not a function. Fatal.
    Bootstrap(String),
    /// A script error surfaced through a host call (`eval`, `with_lua`).
    Script(String),
    /// Loading a native module failed.
    Module { name: String, message: String },
    /// The queue was canceled while the caller waited on it.
    QueueCanceled,
    /// The runtime has been torn down.
    ShutDown,
    /// A worker thread could not be spawned.
    Thread(String),
}

impl RuntimeError {
    /// Returns true for conditions the host must terminate on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bootstrap(_))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootstrap(msg) => write!(f, "bootstrap failed: {msg}"),
            Self::Script(msg) => write!(f, "script error: {msg}"),
            Self::Module { name, message } => write!(f, "module '{name}': {message}"),
            Self::QueueCanceled => write!(f, "queue canceled"),
            Self::ShutDown => write!(f, "runtime is shut down"),
            Self::Thread(msg) => write!(f, "thread error: {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<mlua::Error> for RuntimeError {
    fn from(e: mlua::Error) -> Self {
        Self::Script(crate::format::format_lua_error(&e))
    }
}

/// Non-blocking queue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity.
    Full,
    /// Queue has been canceled (shutdown).
    Canceled,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "queue is full"),
            Self::Canceled => write!(f, "queue canceled"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<QueueError> for RuntimeError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Canceled => Self::QueueCanceled,
            QueueError::Full => Self::Script(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            RuntimeError::Module { name: "gl".into(), message: "no such module".into() }.to_string(),
            "module 'gl': no such module"
        );
        assert_eq!(RuntimeError::ShutDown.to_string(), "runtime is shut down");
        assert_eq!(QueueError::Full.to_string(), "queue is full");
    }

    #[test]
    fn test_only_bootstrap_is_fatal() {
        assert!(RuntimeError::Bootstrap("empty".into()).is_fatal());
        assert!(!RuntimeError::Script("x".into()).is_fatal());
        assert!(!RuntimeError::QueueCanceled.is_fatal());
    }

    #[test]
    fn test_queue_error_conversion() {
        assert!(matches!(RuntimeError::from(QueueError::Canceled), RuntimeError::QueueCanceled));
        assert!(matches!(RuntimeError::from(QueueError::Full), RuntimeError::Script(_)));
    }
}
