//! Scheduler error types.

/// Errors surfaced by system scheduling.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// A system panicked mid-tick. Systems that already ran have committed
    /// their writes; the tick is partial and the next tick proceeds
    /// normally.
    #[error("system '{name}' panicked during tick {tick}")]
    SystemPanicked {
        /// Name of the failing system.
        name: String,
        /// The tick that was aborted.
        tick: u64,
    },
}
