//! Snare ターゲットプロセス制御
//!
//! このクレートは、デバッグ対象のプロセス（tracee）を制御するための低レベル機能を提供します。
//! プロセスの起動、ptrace による停止・再開、メモリアクセス、レジスタアクセス、
//! ソフトウェアブレークポイントの設置などを行います。
//!
//! 対応プラットフォームは x86_64 Linux のみです。

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("snare-target supports only x86_64 Linux");

pub mod address;
pub mod breakpoint;
pub mod errors;
pub mod event;
pub mod memory;
pub mod process;
pub mod registers;

pub use address::Address;
pub use breakpoint::{SoftwareBreakpoint, INT3_OPCODE};
pub use errors::TargetError;
pub use event::{StopEvent, TrapInfo};
pub use memory::Memory;
pub use process::Tracee;
pub use registers::{RegisterDump, Registers};

// 上位クレートがnixに直接依存しなくて済むように再エクスポート
pub use nix::sys::signal::Signal;
pub use nix::sys::wait::WaitStatus;
pub use nix::unistd::Pid;

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
