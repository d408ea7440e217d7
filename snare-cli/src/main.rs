//! Snare CLI - コマンドラインインターフェース
//!
//! 指定したプログラムを ptrace 制御下で起動し、ソフトウェアブレークポイントを1つ設置して
//! 到達時に簡易コンソールを開きます。

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use snare_core::parse::parse_address;
use snare_core::session::Operator;
use snare_core::{Address, Console, LineReader, Registers, Session, StopEvent};
use snare_target::Pid;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Snare - a minimal breakpoint debugger
///
/// Runs the specified PROGRAM with the optional ARGS, and inserts a software
/// breakpoint at the given ADDRESS.
#[derive(Parser)]
#[command(name = "snare")]
#[command(version)]
#[command(about = "Run a program and stop it at a single software breakpoint", long_about = None)]
struct Cli {
    /// Breakpoint address (0x-prefixed hex or decimal); prompted for when omitted
    #[arg(short, long, value_parser = address_arg)]
    address: Option<Address>,

    /// Enable debug logging of the trace-control sequence
    #[arg(short, long)]
    verbose: bool,

    /// Program to launch (looked up in PATH)
    program: String,

    /// Arguments to pass to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn address_arg(s: &str) -> Result<Address, String> {
    parse_address(s).map_err(|e| e.to_string())
}

/// rustyline による1行入力
struct Readline {
    editor: DefaultEditor,
}

impl LineReader for Readline {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                Ok(None)
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// 端末のオペレータ
struct Terminal {
    console: Console<Readline, std::io::Stdout>,
}

impl Operator for Terminal {
    fn report(&mut self, event: &StopEvent) {
        println!();
        println!("{}", event);
    }

    fn breakpoint_address(&mut self, registers: &Registers) -> Result<Address> {
        let entry = registers.get_pc()?;
        self.console.prompt_address(Some(entry))
    }

    fn on_breakpoint(&mut self, pid: Pid, registers: &Registers) -> Result<()> {
        self.console.run(pid, registers)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "snare=debug,snare_core=debug,snare_target=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// セッションを実行し、traceeの終了ステータスを返す
fn run(cli: Cli) -> Result<u8> {
    let mut terminal = Terminal {
        console: Console::new(
            Readline {
                editor: DefaultEditor::new()?,
            },
            std::io::stdout(),
        ),
    };

    let mut session = Session::new(cli.address);
    session.run(&cli.program, &cli.args, &mut terminal)?;

    if session.hits() == 0 {
        if let Some(addr) = session.address() {
            tracing::warn!("breakpoint at {} was never reached", addr);
        }
    }

    // 終了コードは 0..=255 に収まる（シグナル終了は 128 + シグナル番号）
    let code = session.exit_code().unwrap_or(0);
    Ok(u8::try_from(code).unwrap_or(1))
}
