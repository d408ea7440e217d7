//! Snare デバッガのコア機能
//!
//! ターゲットプロセスの制御を束ねて、ブレークポイント1つだけを扱う
//! デバッグセッションの状態機械を提供します。

pub mod breakpoint;
pub mod classifier;
pub mod command;
pub mod console;
pub mod errors;
pub mod parse;
pub mod session;

pub use breakpoint::BreakpointManager;
pub use classifier::{classify, Verdict};
pub use command::Command;
pub use console::{Console, LineReader};
pub use errors::SessionError;
pub use session::{Operator, Session, SessionState};

// 他のクレートから使用するために再エクスポート
pub use snare_target::{Address, RegisterDump, Registers, StopEvent};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
