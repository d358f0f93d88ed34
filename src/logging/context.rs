use crate::cli::Command;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Long-running webhook listener.
    Server,
    /// One-shot commands whose stdout carries the result.
    LocalDev,
}

impl ExecutionContext {
    /// Returns `true` when console logs may share stdout.
    pub fn owns_stdout(self) -> bool {
        matches!(self, ExecutionContext::Server)
    }
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Serve(_) => ExecutionContext::Server,
        Command::Run(_) | Command::Validate(_) => ExecutionContext::LocalDev,
    }
}
