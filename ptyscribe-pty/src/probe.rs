//! Answers "is the program on this PTY blocked reading the terminal?"
//!
//! The shell owns the foreground process group while it sits at its prompt.
//! Any other foreground group that is parked in a tty read is a running
//! program waiting for the user.

use anyhow::Result;
use ptyscribe_core::{InputProbe, InputWait};

use crate::pty_manager::SharedMaster;

#[derive(Clone)]
pub struct PtyInputProbe {
    master: SharedMaster,
    shell_pid: Option<u32>,
}

impl std::fmt::Debug for PtyInputProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyInputProbe")
            .field("shell_pid", &self.shell_pid)
            .finish_non_exhaustive()
    }
}

impl PtyInputProbe {
    pub(crate) fn new(master: SharedMaster, shell_pid: Option<u32>) -> Self {
        Self { master, shell_pid }
    }
}

impl InputProbe for PtyInputProbe {
    #[cfg(unix)]
    fn input_wait(&self) -> Result<InputWait> {
        let master = self
            .master
            .lock()
            .map_err(|_| anyhow::anyhow!("PTY master lock poisoned"))?;

        let fd = master
            .as_raw_fd()
            .ok_or_else(|| anyhow::anyhow!("PTY master has no file descriptor"))?;
        let Some(foreground) = master.process_group_leader() else {
            return Ok(InputWait::default());
        };

        let canonical = unix::is_canonical(fd)?;
        let available_bytes = unix::available_bytes(fd)?;

        let shell_owns_terminal = self
            .shell_pid
            .is_some_and(|pid| i64::from(pid) == i64::from(foreground));
        let waiting = !shell_owns_terminal && unix::blocked_on_tty_read(foreground);

        Ok(InputWait {
            waiting,
            canonical,
            available_bytes,
        })
    }

    #[cfg(not(unix))]
    fn input_wait(&self) -> Result<InputWait> {
        let _ = (&self.master, self.shell_pid);
        Ok(InputWait::default())
    }
}

#[cfg(unix)]
mod unix {
    use anyhow::{Context, Result};
    use nix::sys::termios::{tcgetattr, LocalFlags};
    use std::os::fd::{BorrowedFd, RawFd};

    pub(super) fn is_canonical(fd: RawFd) -> Result<bool> {
        // SAFETY: the caller holds the master lock, so the fd stays open for
        // the duration of this call.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let termios = tcgetattr(borrowed).context("tcgetattr on PTY master failed")?;
        Ok(termios.local_flags.contains(LocalFlags::ICANON))
    }

    pub(super) fn available_bytes(fd: RawFd) -> Result<usize> {
        let mut n: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int through the pointer.
        let rc = unsafe { libc::ioctl(fd, libc::FIONREAD as _, &mut n) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error()).context("FIONREAD on PTY master failed");
        }
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Sleeping in the kernel's tty read path.
    ///
    /// `n_tty_read` is unambiguous. Newer kernels report the generic
    /// `wait_woken` instead, which sockets share, so there the fd being read
    /// must be a terminal.
    #[cfg(target_os = "linux")]
    pub(super) fn blocked_on_tty_read(pid: libc::pid_t) -> bool {
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return false;
        };
        if process_state(&stat) != Some('S') {
            return false;
        }
        let Ok(wchan) = std::fs::read_to_string(format!("/proc/{pid}/wchan")) else {
            return false;
        };

        match wait_channel(&wchan) {
            WaitChannel::TtyRead => true,
            WaitChannel::Generic => reading_fd(pid).is_some_and(|fd| fd_is_terminal(pid, fd)),
            WaitChannel::Other => false,
        }
    }

    /// Without procfs the foreground group is the best signal there is.
    #[cfg(not(target_os = "linux"))]
    pub(super) fn blocked_on_tty_read(_pid: libc::pid_t) -> bool {
        true
    }

    /// State letter from `/proc/<pid>/stat`. The command name may itself
    /// contain `)`, so look after the last one.
    #[cfg(target_os = "linux")]
    pub(super) fn process_state(stat: &str) -> Option<char> {
        let after = &stat[stat.rfind(')')? + 1..];
        after.trim_start().chars().next()
    }

    #[cfg(target_os = "linux")]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) enum WaitChannel {
        TtyRead,
        Generic,
        Other,
    }

    #[cfg(target_os = "linux")]
    pub(super) fn wait_channel(wchan: &str) -> WaitChannel {
        match wchan.trim() {
            w if w.contains("n_tty_read") || w == "tty_read" => WaitChannel::TtyRead,
            "wait_woken" => WaitChannel::Generic,
            _ => WaitChannel::Other,
        }
    }

    /// First syscall argument of a process blocked in `read`-like calls.
    #[cfg(target_os = "linux")]
    fn reading_fd(pid: libc::pid_t) -> Option<i32> {
        let syscall = std::fs::read_to_string(format!("/proc/{pid}/syscall")).ok()?;
        syscall_first_arg(&syscall)
    }

    /// `/proc/<pid>/syscall` is `<nr> <arg0> ... <sp> <pc>`, or `running`,
    /// or `-1 <sp> <pc>` outside a syscall.
    #[cfg(target_os = "linux")]
    pub(super) fn syscall_first_arg(syscall: &str) -> Option<i32> {
        let mut fields = syscall.split_whitespace();
        let nr: i64 = fields.next()?.parse().ok()?;
        if nr < 0 {
            return None;
        }
        let arg = fields.next()?.strip_prefix("0x")?;
        i32::try_from(u64::from_str_radix(arg, 16).ok()?).ok()
    }

    #[cfg(target_os = "linux")]
    fn fd_is_terminal(pid: libc::pid_t, fd: i32) -> bool {
        std::fs::read_link(format!("/proc/{pid}/fd/{fd}"))
            .map(|target| is_terminal_path(&target.to_string_lossy()))
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    pub(super) fn is_terminal_path(target: &str) -> bool {
        target.starts_with("/dev/pts/") || target.starts_with("/dev/tty")
    }

}
