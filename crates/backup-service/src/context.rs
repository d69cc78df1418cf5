use core::fmt::Display;

use shared::{BackupId, ServerId};

/// Holds the context for the current operation. Used for prefixing logs.
#[derive(Default, Debug, Clone)]
pub struct Context {
    /// The server being operated on.
    pub server: Option<ServerId>,
    /// The backup being operated on.
    pub backup: Option<BackupId>,
    /// The current context
    pub current_context: &'static str,
}

impl Context {
    /// A context for an operation on `server`.
    pub fn for_server(server: &ServerId, current_context: &'static str) -> Self {
        Self {
            server: Some(server.clone()),
            backup: None,
            current_context,
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match (&self.server, &self.backup) {
            (Some(server), Some(backup)) => write!(f, "[{server}/{backup}] ")?,
            (Some(server), None) => write!(f, "[{server}] ")?,
            (None, Some(backup)) => write!(f, "[backup {backup}] ")?,
            (None, None) => {}
        }

        write!(f, "[{}] ", self.current_context)?;

        Ok(())
    }
}
