//! Scheduler hooks used by the syscall layer

use crate::process::Process;

/// The two scheduling decisions a process can ask for.
///
/// Implementations own `Ready` and the other queue states; the dispatcher
/// sets [`TaskStatus::Running`](crate::TaskStatus::Running) on every process
/// that traps into it.
pub trait Scheduler {
    /// Give up the CPU. Returns when `current` is picked again.
    fn yield_now(&mut self, current: &mut Process);

    /// Terminate `current` with `code`.
    ///
    /// After this returns the trap path must not resume `current`; the
    /// dispatcher signals that with [`Completion::Exited`](crate::Completion::Exited).
    fn exit(&mut self, current: &mut Process, code: i32);
}
