//! ソフトウェアブレークポイント

use crate::{Address, Memory, Result, TargetError};

/// INT3命令のオペコード
pub const INT3_OPCODE: u8 = 0xCC;

/// ソフトウェアブレークポイント（INT3命令）
///
/// 設置時に元のバイトを退避し、解除時にちょうど一度だけ書き戻します。
#[derive(Debug, Clone)]
pub struct SoftwareBreakpoint {
    address: Address,
    original_byte: Option<u8>,
    installed: bool,
}

impl SoftwareBreakpoint {
    /// ブレークポイントを作成する（まだ設置しない）
    pub fn new(address: Address) -> Self {
        Self {
            address,
            original_byte: None,
            installed: false,
        }
    }

    /// ブレークポイントのアドレスを取得する
    pub fn address(&self) -> Address {
        self.address
    }

    /// 設置済みかどうか
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// 退避した元のバイトを取得する
    pub fn original_byte(&self) -> Option<u8> {
        self.original_byte
    }

    /// ブレークポイントを設置する
    ///
    /// 元のバイトを読み取ってから0xCC（INT3）を書き込みます。tracee は停止している必要があります。
    pub fn install(&mut self, memory: &Memory) -> Result<()> {
        if self.installed {
            return Err(TargetError::AlreadyInstalled(self.address).into());
        }

        // 元のバイトを保存してからINT3で置き換える
        let original = memory.read_u8(self.address)?;
        memory.write_u8(self.address, INT3_OPCODE)?;

        tracing::debug!(
            "inserted breakpoint at {} (original byte {:#04x})",
            self.address,
            original
        );

        self.original_byte = Some(original);
        self.installed = true;
        Ok(())
    }

    /// ブレークポイントを解除する
    ///
    /// 退避しておいた元のバイトを書き戻します。設置されていなければエラーです。
    pub fn remove(&mut self, memory: &Memory) -> Result<()> {
        let original = match (self.installed, self.original_byte) {
            (true, Some(byte)) => byte,
            _ => return Err(TargetError::NotInstalled(self.address).into()),
        };

        memory.write_u8(self.address, original)?;

        tracing::debug!("restored original byte {:#04x} at {}", original, self.address);

        self.installed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_new_breakpoint_is_not_installed() {
        let bp = SoftwareBreakpoint::new(Address::new(0x401000));
        assert!(!bp.is_installed());
        assert_eq!(bp.original_byte(), None);
        assert_eq!(bp.address(), Address::new(0x401000));
    }

    #[test]
    fn test_remove_without_install_fails() {
        // メモリには触れずに失敗するので、存在しないPIDで構わない
        let memory = Memory::new(Pid::from_raw(i32::MAX));
        let mut bp = SoftwareBreakpoint::new(Address::new(0x401000));

        let err = bp.remove(&memory).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TargetError>(),
            Some(TargetError::NotInstalled(addr)) if *addr == Address::new(0x401000)
        ));
    }

    #[test]
    fn test_install_into_missing_process_fails() {
        let memory = Memory::new(Pid::from_raw(i32::MAX));
        let mut bp = SoftwareBreakpoint::new(Address::new(0x401000));

        assert!(bp.install(&memory).is_err());
        assert!(!bp.is_installed());
    }
}
