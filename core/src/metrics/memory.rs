//! Process memory sampling.

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Resident set size of the current process in bytes, or `None` when the
/// platform doesn't report it.
pub fn current_rss_bytes() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|process| process.memory())
}
