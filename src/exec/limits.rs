/// Kernel resource limits applied in the child between fork and exec
use nix::sys::resource::{setrlimit, Resource};
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Install a pre-exec hook that caps the address space at `address_space_kb`
/// and disables core dumps. `None` leaves the address space unlimited.
pub fn apply_rlimits(command: &mut Command, address_space_kb: Option<u64>) {
    let address_space_bytes = address_space_kb.map(|kb| kb.saturating_mul(1024));

    // SAFETY: the hook only issues setrlimit(2), which is async-signal-safe,
    // and allocates nothing.
    unsafe {
        command.pre_exec(move || {
            setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(io::Error::from)?;
            if let Some(bytes) = address_space_bytes {
                setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(io::Error::from)?;
            }
            Ok(())
        });
    }
}
