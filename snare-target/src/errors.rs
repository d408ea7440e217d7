//! ターゲット制御のエラー型

use crate::Address;
use nix::unistd::Pid;

/// ターゲット制御で発生するエラー
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// fork に失敗した
    #[error("failed to fork tracee")]
    Fork(#[source] nix::Error),

    /// プログラムパスや引数にNULバイトが含まれている
    #[error("invalid program argument {0:?}: contains a NUL byte")]
    InvalidArgument(String),

    /// ptrace / waitpid 呼び出しの失敗
    #[error("{op} failed for PID {pid}")]
    TraceControl {
        op: &'static str,
        pid: Pid,
        #[source]
        source: nix::Error,
    },

    /// メモリの読み書きに失敗した
    #[error("failed to {action} {len} byte(s) at {addr} in PID {pid}: {reason}")]
    Memory {
        action: &'static str,
        addr: Address,
        len: usize,
        pid: Pid,
        reason: String,
    },

    /// ブレークポイントが設置されていない状態で解除しようとした
    #[error("no breakpoint installed at {0}")]
    NotInstalled(Address),

    /// 既に設置済みのブレークポイントを再設置しようとした
    #[error("breakpoint already installed at {0}")]
    AlreadyInstalled(Address),
}

impl TargetError {
    pub(crate) fn trace(op: &'static str, pid: Pid) -> impl FnOnce(nix::Error) -> Self {
        move |source| Self::TraceControl { op, pid, source }
    }
}
