//! セッションのエラー型

use crate::SessionState;
use snare_target::StopEvent;

/// セッション制御で発生するエラー
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// tracee がまだ存在しない
    #[error("Not attached to a process")]
    NoTracee,

    /// ブレークポイント停止のはずが、設置中のブレークポイントがない
    #[error("no breakpoint installed")]
    NoBreakpoint,

    /// セッションは既に終了している
    #[error("session already terminated")]
    Terminated,

    /// 現在の状態では実行できない操作
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    /// 制御確立中に想定外の停止を観測した
    #[error("expected {expected}, got: {event}")]
    UnexpectedStop {
        expected: &'static str,
        event: StopEvent,
    },

    /// execve 完了前に tracee が終了した（起動失敗）
    #[error("tracee terminated before reaching the program: {0}")]
    LaunchFailed(StopEvent),

    /// オペレータ入力が閉じられた
    #[error("operator input closed")]
    InputClosed,
}
