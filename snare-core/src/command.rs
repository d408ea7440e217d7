//! デバッガコンソールのコマンド

/// コンソールコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 実行継続
    Continue,
    /// レジスタ表示
    Registers,
    /// ヘルプ表示
    Help,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 空行は `Ok(None)`、未知のコマンドは入力をそのまま `Err` で返します。
    pub fn parse(input: &str) -> Result<Option<Self>, String> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(None);
        }

        match parts[0] {
            "continue" | "c" => Ok(Some(Command::Continue)),
            "registers" | "regs" | "r" => Ok(Some(Command::Registers)),
            "help" | "h" | "?" => Ok(Some(Command::Help)),
            _ => Err(input.trim().to_string()),
        }
    }
}
