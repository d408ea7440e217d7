//! トレース対象のアドレス空間を指すアドレス

use std::fmt;

/// tracee のアドレス空間内のアドレス
///
/// デバッガ自身のアドレス空間のポインタではないため、決して参照外しはしません。
/// 読み書きは必ず [`crate::Memory`] を経由します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    /// アドレスを作成する
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// 生の値を取得する
    pub const fn value(self) -> u64 {
        self.0
    }

    /// オフセットを加算する（オーバーフロー時は None）
    pub fn checked_add(self, offset: u64) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
