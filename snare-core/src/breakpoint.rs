//! ブレークポイント管理
//!
//! セッションが同時に持てるブレークポイントは1つだけです。

use crate::Result;
use snare_target::{Address, Memory, SoftwareBreakpoint, TargetError};

/// ブレークポイントマネージャ
///
/// 設置中のソフトウェアブレークポイント（INT3）を最大1つ保持します。
#[derive(Debug, Default)]
pub struct BreakpointManager {
    slot: Option<SoftwareBreakpoint>,
}

impl BreakpointManager {
    /// 新しいブレークポイントマネージャを作成する
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// ブレークポイントを設置する
    ///
    /// 既に別のブレークポイントが設置されていればエラーです。
    pub fn install(&mut self, address: Address, memory: &Memory) -> Result<()> {
        if let Some(existing) = self.installed() {
            return Err(TargetError::AlreadyInstalled(existing.address()).into());
        }

        let mut bp = SoftwareBreakpoint::new(address);
        bp.install(memory)?;
        self.slot = Some(bp);
        Ok(())
    }

    /// 設置中のブレークポイントを解除する
    ///
    /// 元のバイトを書き戻した後、スロットを空にします。
    pub fn remove(&mut self, memory: &Memory) -> Result<()> {
        match self.slot.as_mut() {
            Some(bp) => {
                bp.remove(memory)?;
                self.slot = None;
                Ok(())
            }
            None => Err(anyhow::anyhow!("no breakpoint installed")),
        }
    }

    /// 設置中のブレークポイントを取得する
    pub fn installed(&self) -> Option<&SoftwareBreakpoint> {
        self.slot.as_ref().filter(|bp| bp.is_installed())
    }

    /// 設置中のブレークポイントのアドレス
    pub fn address(&self) -> Option<Address> {
        self.installed().map(SoftwareBreakpoint::address)
    }
}
