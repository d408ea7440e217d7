//! デバッガコンソール
//!
//! ブレークポイントで停止している間にオペレータからのコマンドを処理します。
//! コンソールが動いている間、traceeは停止したままです。

use crate::{parse::parse_address, Command, Result, SessionError};
use snare_target::{Address, Pid, Registers};
use std::io::Write;

/// 1行入力のソース
///
/// CLIでは rustyline、テストでは用意した行のリストを使います。
pub trait LineReader {
    /// プロンプトを表示して1行読む。入力が終わったら `None`
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;
}

/// デバッガコンソール
pub struct Console<R, W> {
    reader: R,
    out: W,
}

impl<R: LineReader, W: Write> Console<R, W> {
    /// 新しいコンソールを作成する
    pub fn new(reader: R, out: W) -> Self {
        Self { reader, out }
    }

    /// 出力先を取得する
    pub fn output(&self) -> &W {
        &self.out
    }

    /// ブレークポイントのアドレスを入力させる
    ///
    /// 空行は再入力、数値として解釈できない入力は報告して再入力させます。
    pub fn prompt_address(&mut self, entry: Option<Address>) -> Result<Address> {
        if let Some(pc) = entry {
            writeln!(self.out, "tracee stopped at entry point {}", pc)?;
        }

        loop {
            let Some(line) = self.reader.read_line("enter the breakpoint address: ")? else {
                return Err(SessionError::InputClosed.into());
            };
            if line.trim().is_empty() {
                continue;
            }

            match parse_address(&line) {
                Ok(addr) => return Ok(addr),
                Err(e) => writeln!(self.out, "{}", e)?,
            }
        }
    }

    /// コマンドループを実行する
    ///
    /// `continue` で戻ります。入力が閉じられた場合も継続として扱います。
    pub fn run(&mut self, pid: Pid, registers: &Registers) -> Result<()> {
        writeln!(self.out, "enter a command: 'c': continue, 'r': print registers")?;

        let prompt = format!("(PID {})> ", pid);
        loop {
            let Some(line) = self.reader.read_line(&prompt)? else {
                tracing::debug!("console input closed, continuing PID {}", pid);
                return Ok(());
            };

            match Command::parse(&line) {
                Ok(None) => continue,
                Ok(Some(Command::Continue)) => return Ok(()),
                Ok(Some(Command::Registers)) => {
                    let dump = registers.dump()?;
                    write!(self.out, "{}", dump)?;
                }
                Ok(Some(Command::Help)) => self.print_help()?,
                Err(input) => writeln!(self.out, "invalid command: '{}'", input)?,
            }
        }
    }

    fn print_help(&mut self) -> Result<()> {
        writeln!(self.out, "Available commands:")?;
        writeln!(self.out, "  continue (c)   - Resume the tracee")?;
        writeln!(self.out, "  registers (r)  - Print the general-purpose registers")?;
        writeln!(self.out, "  help (h)       - Show this help message")?;
        Ok(())
    }
}

/// あらかじめ用意した行を順に返す入力
impl LineReader for std::collections::VecDeque<String> {
    fn read_line(&mut self, _prompt: &str) -> Result<Option<String>> {
        Ok(self.pop_front())
    }
}
