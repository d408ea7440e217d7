//! パース関連のユーティリティ関数

use anyhow::Result;
use snare_target::Address;

/// アドレス文字列をパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート。
/// どちらでもなければプレフィックスなしの16進数として解釈を試みます。
/// 0はアドレス未指定を意味するため受け付けません。
///
/// # Examples
/// ```
/// use snare_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap().value(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap().value(), 1234);
/// ```
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();

    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        // 16進数
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", s, e))?
    } else {
        // 10進数を試す
        s.parse::<u64>()
            .or_else(|_| {
                // 10進数でもダメなら16進数として解釈を試みる
                u64::from_str_radix(s, 16)
            })
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))?
    };

    if value == 0 {
        anyhow::bail!("Invalid address '{}': address must be non-zero", s);
    }
    Ok(Address::new(value))
}
