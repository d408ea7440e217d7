//! デバッグセッションの状態機械
//!
//! traceeの起動から終了までの ptrace 制御の順序を管理します。
//!
//! ```text
//! Initializing --launch--> WaitingForInitialStop --SIGSTOP--> WaitingForExecStop
//!   --exec--> Running --(BreakpointHit)--> StoppedAtBreakpoint --console--> Running
//!                     --(OtherSignal)--> StoppedOther --> Running
//!                     --(exit)--> Terminated
//! ```

use crate::{classify, BreakpointManager, Result, SessionError, Verdict};
use snare_target::{Address, Memory, Pid, Registers, Signal, StopEvent, Tracee};
use std::path::Path;

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    WaitingForInitialStop,
    WaitingForExecStop,
    Running,
    StoppedAtBreakpoint,
    StoppedOther,
    Terminated,
}

/// セッションとオペレータ（人間）との接点
pub trait Operator {
    /// 停止イベントを1件報告する。停止イベントごとにちょうど1回呼ばれる
    fn report(&mut self, event: &StopEvent);

    /// ブレークポイントのアドレスを問い合わせる
    ///
    /// exec 直後の停止中に呼ばれるので、`registers` からエントリポイントなどを読めます。
    fn breakpoint_address(&mut self, registers: &Registers) -> Result<Address>;

    /// ブレークポイントで停止中に呼ばれる。戻るとセッションは実行を再開する
    fn on_breakpoint(&mut self, pid: Pid, registers: &Registers) -> Result<()>;
}

/// デバッグセッション
///
/// 1回の実行につき1つ存在し、tracee を1つ、ブレークポイントを最大1つ所有します。
pub struct Session {
    state: SessionState,
    /// デバッグ対象プロセス
    tracee: Option<Tracee>,
    /// メモリアクセス
    memory: Option<Memory>,
    /// レジスタアクセス
    registers: Option<Registers>,
    /// ブレークポイント管理
    breakpoints: BreakpointManager,
    /// 設置予定のブレークポイントアドレス
    address: Option<Address>,
    /// ブレークポイント到達回数
    hits: usize,
    /// 終了時の停止イベント
    exit: Option<StopEvent>,
}

impl Session {
    /// 新しいセッションを作成する
    ///
    /// `address` が None の場合、exec 後にオペレータに問い合わせます。
    pub fn new(address: Option<Address>) -> Self {
        Self {
            state: SessionState::Initializing,
            tracee: None,
            memory: None,
            registers: None,
            breakpoints: BreakpointManager::new(),
            address,
            hits: 0,
            exit: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// tracee のPID
    pub fn pid(&self) -> Option<Pid> {
        self.tracee.as_ref().map(Tracee::pid)
    }

    /// ブレークポイントのアドレス（確定済みの場合）
    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// ブレークポイントに到達した回数
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    /// traceeの終了コード（シグナルによる終了は 128 + シグナル番号）
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.as_ref().and_then(StopEvent::exit_code)
    }

    /// 起動から終了までセッションを実行する
    ///
    /// ptrace 制御の失敗はすべてセッションを終了させます。その場合 tracee は強制終了されます。
    pub fn run<P, O>(&mut self, program: P, args: &[String], operator: &mut O) -> Result<()>
    where
        P: AsRef<Path>,
        O: Operator + ?Sized,
    {
        let result = self.drive(program.as_ref(), args, operator);
        if let Err(e) = &result {
            tracing::error!("debug session aborted: {:#}", e);
            self.abort();
        }
        result
    }

    fn drive<O: Operator + ?Sized>(&mut self, program: &Path, args: &[String], operator: &mut O) -> Result<()> {
        self.launch(program, args)?;
        self.wait_initial_stop(operator)?;
        self.wait_exec_stop(operator)?;
        while self.state != SessionState::Terminated {
            self.step(operator)?;
        }
        Ok(())
    }

    fn require_state(&self, expected: SessionState, action: &'static str) -> Result<()> {
        match self.state {
            SessionState::Terminated => Err(SessionError::Terminated.into()),
            state if state == expected => Ok(()),
            state => Err(SessionError::InvalidState { action, state }.into()),
        }
    }

    fn tracee(&self) -> Result<&Tracee> {
        self.tracee.as_ref().ok_or_else(|| SessionError::NoTracee.into())
    }

    fn wait(&self) -> Result<StopEvent> {
        self.tracee()?.wait()
    }

    /// traceeを再開する。終了済みやtraceeなしの場合はptraceを呼ばずにエラーとする
    fn resume(&self, signal: Option<Signal>) -> Result<()> {
        if self.state == SessionState::Terminated {
            return Err(SessionError::Terminated.into());
        }
        self.tracee()?.continue_execution(signal)
    }

    /// プログラムを起動する（Initializing → WaitingForInitialStop）
    pub fn launch<P: AsRef<Path>>(&mut self, program: P, args: &[String]) -> Result<()> {
        self.require_state(SessionState::Initializing, "launch")?;

        let tracee = Tracee::launch(program, args)?;
        let pid = tracee.pid();
        tracing::debug!("init debugging of PID {}", pid);

        self.memory = Some(Memory::new(pid));
        self.registers = Some(Registers::new(pid));
        self.tracee = Some(tracee);
        self.state = SessionState::WaitingForInitialStop;
        Ok(())
    }

    /// 子プロセス自身が送った SIGSTOP を待ち、exec の捕捉を有効にして再開する
    pub fn wait_initial_stop<O: Operator + ?Sized>(&mut self, operator: &mut O) -> Result<()> {
        self.require_state(SessionState::WaitingForInitialStop, "wait for the initial stop")?;

        let event = self.wait()?;
        operator.report(&event);

        if event.is_terminated() {
            self.release(event);
            return Err(SessionError::LaunchFailed(event).into());
        }
        if !event.is_signal_delivery_stop() || event.signal() != Some(Signal::SIGSTOP) {
            return Err(SessionError::UnexpectedStop {
                expected: "SIGSTOP",
                event,
            }
            .into());
        }

        let tracee = self.tracee()?;
        tracee.trace_exec()?;
        tracee.continue_execution(None)?;
        self.state = SessionState::WaitingForExecStop;
        Ok(())
    }

    /// exec によるSIGTRAPを待ち、ブレークポイントを設置して再開する
    pub fn wait_exec_stop<O: Operator + ?Sized>(&mut self, operator: &mut O) -> Result<()> {
        self.require_state(SessionState::WaitingForExecStop, "wait for the exec stop")?;

        let event = self.wait()?;
        operator.report(&event);

        if event.is_terminated() {
            // execvp に失敗した子プロセスはここで終了している
            self.release(event);
            return Err(SessionError::LaunchFailed(event).into());
        }
        if !event.is_exec_stop() {
            return Err(SessionError::UnexpectedStop {
                expected: "exec SIGTRAP",
                event,
            }
            .into());
        }

        let registers = *self.registers.as_ref().ok_or(SessionError::NoTracee)?;
        let memory = *self.memory.as_ref().ok_or(SessionError::NoTracee)?;

        let address = match self.address {
            Some(addr) => addr,
            None => operator.breakpoint_address(&registers)?,
        };
        self.address = Some(address);

        tracing::debug!("inserting breakpoint at address {}", address);
        self.breakpoints.install(address, &memory)?;

        self.resume(None)?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// 次の停止イベントを1件処理する（Running 状態）
    ///
    /// 処理後の状態を返します。
    pub fn step<O: Operator + ?Sized>(&mut self, operator: &mut O) -> Result<SessionState> {
        self.require_state(SessionState::Running, "wait for the next stop")?;

        let event = self.wait()?;
        operator.report(&event);

        if event.is_terminated() {
            tracing::debug!("tracee terminated: {}", event);
            self.release(event);
            return Ok(self.state);
        }

        if !event.is_stopped() {
            // WIFCONTINUED など。停止していないので何もしない
            return Ok(self.state);
        }

        match classify(&event, self.breakpoints.address()) {
            Verdict::BreakpointHit => self.handle_breakpoint(operator)?,
            Verdict::OtherSignal => self.handle_other(&event)?,
        }
        Ok(self.state)
    }

    fn handle_breakpoint<O: Operator + ?Sized>(&mut self, operator: &mut O) -> Result<()> {
        self.state = SessionState::StoppedAtBreakpoint;
        self.hits += 1;

        let pid = self.tracee()?.pid();
        let registers = *self.registers.as_ref().ok_or(SessionError::NoTracee)?;
        let memory = *self.memory.as_ref().ok_or(SessionError::NoTracee)?;
        let address = self.breakpoints.address().ok_or(SessionError::NoBreakpoint)?;

        tracing::info!(">>> PID {} reached the breakpoint at address {}", pid, address);

        operator.on_breakpoint(pid, &registers)?;

        // INT3 で1進んだRIPを巻き戻してから元のバイトを戻す
        registers.set_pc(address)?;
        self.breakpoints.remove(&memory)?;

        tracing::debug!("<<< resuming PID {}", pid);
        self.resume(None)?;
        self.state = SessionState::Running;
        Ok(())
    }

    fn handle_other(&mut self, event: &StopEvent) -> Result<()> {
        self.state = SessionState::StoppedOther;

        let inject = injected_signal(event);
        tracing::warn!("unhandled stop: {} (re-injecting {:?})", event, inject);

        self.resume(inject)?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// 回収済みの tracee を手放して Terminated にする
    ///
    /// waitpid で回収した後のPIDは再利用されうるため、以後一切のシグナルを送らない。
    fn release(&mut self, event: StopEvent) {
        self.exit = Some(event);
        self.state = SessionState::Terminated;
        self.tracee = None;
        self.memory = None;
        self.registers = None;
    }

    /// セッションを中断する。生存中の tracee は強制終了する
    pub fn abort(&mut self) {
        if self.state != SessionState::Terminated {
            if let Some(tracee) = self.tracee.take() {
                if let Err(e) = tracee.kill() {
                    tracing::warn!("failed to kill PID {}: {:#}", tracee.pid(), e);
                }
            }
        }
        self.memory = None;
        self.registers = None;
        self.state = SessionState::Terminated;
    }
}

/// StoppedOther から再開するときに配送し直すシグナル
///
/// シグナル配送停止のシグナルはそのまま配送する。SIGTRAP はユーザ空間から送られたもの
/// （si_code <= 0）だけを配送し、カーネル由来のトラップは握りつぶす。
/// ptraceイベント停止ではシグナルを配送しない。
fn injected_signal(event: &StopEvent) -> Option<Signal> {
    if !event.is_signal_delivery_stop() {
        return None;
    }
    match event.signal()? {
        Signal::SIGTRAP => match event.trap {
            Some(trap) if trap.si_code <= 0 => Some(Signal::SIGTRAP),
            _ => None,
        },
        sig => Some(sig),
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort();
    }
}
