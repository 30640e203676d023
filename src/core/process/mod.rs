// ─── Process table ───
// Queries over the live OS process table and detached spawning.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(windows)]
use std::os::windows::process::CommandExt;

use tracing::debug;

use crate::core::error::{WeaveError, WeaveResult};

/// One live process, as much as the OS was willing to tell us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub exe: Option<PathBuf>,
    pub cmdline: Vec<String>,
}

impl ProcessEntry {
    pub fn command_line(&self) -> String {
        self.cmdline.join(" ")
    }
}

/// Lookup by image name (`LeagueClientUx.exe`, `mod-tools.exe`, ...).
pub trait ProcessTable: Send + Sync {
    fn find(&self, image: &str) -> Vec<ProcessEntry>;

    /// Terminates every process with the given image name and returns how many
    /// were signalled. Zero is not an error.
    fn kill(&self, image: &str) -> usize;

    fn is_running(&self, image: &str) -> bool {
        !self.find(image).is_empty()
    }
}

/// `sysinfo`-backed view of the real process table. Every call takes a fresh
/// snapshot, which is why callers keep process lookups as late fallbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn find(&self, image: &str) -> Vec<ProcessEntry> {
        let system = sysinfo::System::new_all();
        system
            .processes()
            .values()
            .filter(|process| image_matches(process.name(), process.exe(), image))
            .map(|process| ProcessEntry {
                pid: process.pid().as_u32(),
                exe: process.exe().map(|p| p.to_path_buf()),
                cmdline: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect()
    }

    fn kill(&self, image: &str) -> usize {
        let system = sysinfo::System::new_all();
        let mut killed = 0;
        for process in system.processes().values() {
            if image_matches(process.name(), process.exe(), image) && process.kill() {
                debug!("Killed {} (pid {})", image, process.pid().as_u32());
                killed += 1;
            }
        }
        killed
    }
}

/// Case-insensitive match on the process name, falling back to the
/// executable's file name (Linux truncates `comm` to 15 bytes).
fn image_matches(name: &OsStr, exe: Option<&std::path::Path>, image: &str) -> bool {
    if name.to_string_lossy().eq_ignore_ascii_case(image) {
        return true;
    }
    exe.and_then(|p| p.file_name())
        .map(|file| file.to_string_lossy().eq_ignore_ascii_case(image))
        .unwrap_or(false)
}

/// Start `cmd` so that it outlives this process: no inherited standard
/// streams and its own process group. Returns the child's PID.
pub fn spawn_detached(mut cmd: Command) -> WeaveResult<u32> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    configure_detached_spawn(&mut cmd);

    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .map_err(|e| WeaveError::Launch(format!("{program}: {e}")))?;
    let pid = child.id();

    // Reap on a plain thread so an exited child does not linger as a zombie;
    // the thread never keeps this process alive.
    std::thread::spawn(move || {
        let _ = child.wait();
    });

    Ok(pid)
}

fn configure_detached_spawn(cmd: &mut Command) {
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }
}
