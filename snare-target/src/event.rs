//! 停止イベント
//!
//! waitpid が返すたびに取得する、traceeの状態のスナップショットです。

use crate::Address;
use nix::libc;
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::fmt;

pub use nix::libc::PTRACE_EVENT_EXEC;

/// SIGTRAPの詳細（siginfo の si_code とトラップ時点のRIP）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapInfo {
    pub si_code: i32,
    pub pc: Address,
}

/// 停止イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopEvent {
    /// waitpid の生のステータス
    pub status: WaitStatus,
    /// SIGTRAPによるシグナル配送停止の場合のみ設定される
    pub trap: Option<TrapInfo>,
}

impl StopEvent {
    /// ステータスから停止イベントを作成する
    pub fn new(status: WaitStatus) -> Self {
        Self { status, trap: None }
    }

    /// トラップ詳細を付与する
    pub fn with_trap(mut self, trap: TrapInfo) -> Self {
        self.trap = Some(trap);
        self
    }

    /// 報告されたシグナル
    pub fn signal(&self) -> Option<Signal> {
        match self.status {
            WaitStatus::Stopped(_, sig)
            | WaitStatus::PtraceEvent(_, sig, _)
            | WaitStatus::Signaled(_, sig, _) => Some(sig),
            _ => None,
        }
    }

    /// traceeが停止中か
    pub fn is_stopped(&self) -> bool {
        matches!(
            self.status,
            WaitStatus::Stopped(..) | WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(_)
        )
    }

    /// プロセスが終了したか（正常終了またはシグナルによる終了）
    pub fn is_terminated(&self) -> bool {
        matches!(self.status, WaitStatus::Exited(..) | WaitStatus::Signaled(..))
    }

    /// シグナル配送停止か（ptraceイベント停止を含まない）
    pub fn is_signal_delivery_stop(&self) -> bool {
        matches!(self.status, WaitStatus::Stopped(..))
    }

    /// execve によるイメージ置換で発生した停止か
    ///
    /// PTRACE_O_TRACEEXEC 設定時は PTRACE_EVENT_EXEC として、
    /// 未設定時は単なる SIGTRAP として報告されます。
    pub fn is_exec_stop(&self) -> bool {
        match self.status {
            WaitStatus::PtraceEvent(_, Signal::SIGTRAP, event) => event == libc::PTRACE_EVENT_EXEC,
            WaitStatus::Stopped(_, Signal::SIGTRAP) => true,
            _ => false,
        }
    }

    /// 終了コード相当の値（シグナル終了なら 128 + シグナル番号）
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            WaitStatus::Exited(_, code) => Some(code),
            WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
            _ => None,
        }
    }
}

impl fmt::Display for StopEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            WaitStatus::Exited(pid, code) => write!(f, "PID {} exited with status {}", pid, code),
            WaitStatus::Signaled(pid, sig, core) => {
                write!(f, "PID {} killed by signal {}", pid, sig)?;
                if core {
                    write!(f, " (core dumped)")?;
                }
                Ok(())
            }
            WaitStatus::Stopped(pid, sig) => {
                write!(f, "PID {} stopped by signal {}", pid, sig)?;
                if let Some(trap) = self.trap {
                    write!(f, " (si_code {:#x}, rip {})", trap.si_code, trap.pc)?;
                }
                Ok(())
            }
            WaitStatus::PtraceEvent(pid, sig, event) => {
                let name = match event {
                    libc::PTRACE_EVENT_EXEC => "exec",
                    libc::PTRACE_EVENT_FORK => "fork",
                    libc::PTRACE_EVENT_VFORK => "vfork",
                    libc::PTRACE_EVENT_CLONE => "clone",
                    libc::PTRACE_EVENT_EXIT => "exit",
                    _ => "unknown",
                };
                write!(f, "PID {} stopped by signal {} (ptrace event {})", pid, sig, name)
            }
            WaitStatus::PtraceSyscall(pid) => write!(f, "PID {} stopped at a syscall", pid),
            WaitStatus::Continued(pid) => write!(f, "PID {} continued", pid),
            WaitStatus::StillAlive => write!(f, "no state change"),
        }
    }
}
