//! プロセス制御機能

use crate::{Address, Result, StopEvent, TargetError, TrapInfo};
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use std::ffi::CString;
use std::path::Path;

/// ptrace 制御下のプロセス
///
/// 1つのセッションが生存期間を通して排他的に所有します。
#[derive(Debug)]
pub struct Tracee {
    pid: Pid,
}

impl Tracee {
    /// 実行可能ファイルを起動してトレース対象プロセスを作成する
    ///
    /// fork した子プロセスは、(1) PTRACE_TRACEME で親の tracee になり、
    /// (2) 自分自身に SIGSTOP を送って確定した初期停止状態を親に観測させ、
    /// (3) execvp でイメージを置き換えます。
    /// execvp が失敗した場合、子プロセスはエラーを表示して終了コード1で終了します。
    pub fn launch<P: AsRef<Path>>(program: P, args: &[String]) -> Result<Self> {
        use nix::unistd::{execvp, fork, ForkResult};

        let program = program.as_ref().to_string_lossy().into_owned();

        // fork前にCStringへの変換を済ませておく（子プロセスでのアロケーションを避ける）
        let program_cstring =
            CString::new(program.as_str()).map_err(|_| TargetError::InvalidArgument(program.clone()))?;
        let mut cstring_args = vec![program_cstring.clone()];
        for arg in args {
            cstring_args.push(CString::new(arg.as_str()).map_err(|_| TargetError::InvalidArgument(arg.clone()))?);
        }

        // SAFETY: 子プロセスでは traceme / raise / execvp / _exit のみを呼び出す
        match unsafe { fork() }.map_err(TargetError::Fork)? {
            ForkResult::Parent { child } => {
                tracing::debug!("launched tracee {} for {}", child, program);
                Ok(Self { pid: child })
            }
            ForkResult::Child => {
                if let Err(e) = ptrace::traceme() {
                    eprintln!("PTRACE_TRACEME: {}", e);
                    unsafe { nix::libc::_exit(1) };
                }
                if let Err(e) = signal::raise(Signal::SIGSTOP) {
                    eprintln!("raise(SIGSTOP): {}", e);
                    unsafe { nix::libc::_exit(1) };
                }

                // 成功すると戻ってこない
                let err = match execvp(&program_cstring, &cstring_args) {
                    Ok(never) => match never {},
                    Err(e) => e,
                };
                eprintln!("{}: {}", program, err.desc());
                unsafe { nix::libc::_exit(1) }
            }
        }
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// 次の状態変化まで待機する（タイムアウトなし）
    ///
    /// SIGTRAPによるシグナル配送停止の場合は、分類に必要な siginfo と RIP も取得します。
    pub fn wait(&self) -> Result<StopEvent> {
        let status = waitpid(self.pid, None).map_err(TargetError::trace("waitpid", self.pid))?;
        let event = StopEvent::new(status);

        if event.is_signal_delivery_stop() && event.signal() == Some(Signal::SIGTRAP) {
            return Ok(event.with_trap(self.trap_info()?));
        }
        Ok(event)
    }

    /// 直近のSIGTRAPの詳細を取得する
    fn trap_info(&self) -> Result<TrapInfo> {
        let siginfo = ptrace::getsiginfo(self.pid).map_err(TargetError::trace("PTRACE_GETSIGINFO", self.pid))?;
        let regs = ptrace::getregs(self.pid).map_err(TargetError::trace("PTRACE_GETREGS", self.pid))?;
        Ok(TrapInfo {
            si_code: siginfo.si_code,
            pc: Address::new(regs.rip),
        })
    }

    /// execve をイベントとして捕捉するよう設定する（PTRACE_O_TRACEEXEC）
    pub fn trace_exec(&self) -> Result<()> {
        ptrace::setoptions(self.pid, ptrace::Options::PTRACE_O_TRACEEXEC)
            .map_err(TargetError::trace("PTRACE_SETOPTIONS(PTRACE_O_TRACEEXEC)", self.pid))?;
        Ok(())
    }

    /// プロセスを実行継続する
    ///
    /// `signal` を指定すると、再開時にそのシグナルを tracee に配送します。
    pub fn continue_execution(&self, signal: Option<Signal>) -> Result<()> {
        tracing::debug!("resuming PID {} (signal: {:?})", self.pid, signal);
        ptrace::cont(self.pid, signal).map_err(TargetError::trace("PTRACE_CONT", self.pid))?;
        Ok(())
    }

    /// プロセスを強制終了して回収する
    ///
    /// セッションが異常終了した際の後始末に使います。
    pub fn kill(&self) -> Result<()> {
        signal::kill(self.pid, Signal::SIGKILL).map_err(TargetError::trace("kill(SIGKILL)", self.pid))?;
        // ゾンビを残さないよう回収する
        let _ = waitpid(self.pid, None);
        Ok(())
    }
}
