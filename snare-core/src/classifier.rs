//! 停止イベントの分類
//!
//! 停止したtraceeが「設置したブレークポイントに到達した」のか、
//! それ以外のシグナルやトラップで止まったのかを判定します。

use snare_target::{Address, Signal, StopEvent};

/// x86 の INT3 によるトラップで報告される si_code
pub const SI_KERNEL: i32 = 0x80;
/// アーキテクチャ共通のブレークポイントトラップ
pub const TRAP_BRKPT: i32 = 1;

/// 分類結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    BreakpointHit,
    OtherSignal,
}

/// 停止イベントを分類する
///
/// 次のすべてを満たす場合のみ `BreakpointHit` です。
/// - 報告されたシグナルが SIGTRAP（シグナル配送停止）である
/// - si_code が命令ブレークポイントによるトラップを示す
/// - トラップ時のRIPがブレークポイントのアドレス+1に等しい
///
/// `breakpoint` には設置中のブレークポイントのアドレスを渡します。
/// 設置されていない（None）場合は常に `OtherSignal` です。
pub fn classify(event: &StopEvent, breakpoint: Option<Address>) -> Verdict {
    let Some(trap_pc) = breakpoint.and_then(|addr| addr.checked_add(1)) else {
        return Verdict::OtherSignal;
    };

    if !event.is_signal_delivery_stop() || event.signal() != Some(Signal::SIGTRAP) {
        return Verdict::OtherSignal;
    }

    match event.trap {
        Some(trap)
            if is_breakpoint_code(trap.si_code) && trap.pc == trap_pc =>
        {
            Verdict::BreakpointHit
        }
        _ => Verdict::OtherSignal,
    }
}

fn is_breakpoint_code(si_code: i32) -> bool {
    si_code == SI_KERNEL || si_code == TRAP_BRKPT
}
