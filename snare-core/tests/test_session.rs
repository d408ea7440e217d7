//! 実プロセスを使ったセッションのテスト

use snare_core::session::Operator;
use snare_core::{Address, Console, Registers, Session, SessionError, SessionState, StopEvent};
use snare_target::{Pid, Signal};
use std::collections::VecDeque;
use std::path::PathBuf;

/// 入力をあらかじめ決めておくオペレータ
#[derive(Default)]
struct ScriptedOperator {
    /// 報告された停止イベント
    events: Vec<StopEvent>,
    /// exec 直後のプログラムカウンタ
    entry: Option<Address>,
    /// ブレークポイント停止時に読んだプログラムカウンタ
    hit_pcs: Vec<Address>,
    /// 設置先をスタックポインタ以下（実行されない領域）にする
    plant_below_stack: bool,
    /// アドレス入力プロンプトに与える行（{entry} は実際のエントリに置換）
    prompt_lines: Vec<&'static str>,
    /// コンソールに与える行
    console_lines: Vec<&'static str>,
    /// コンソールの出力
    console_output: String,
}

impl Operator for ScriptedOperator {
    fn report(&mut self, event: &StopEvent) {
        self.events.push(*event);
    }

    fn breakpoint_address(&mut self, registers: &Registers) -> snare_core::Result<Address> {
        let entry = registers.get_pc()?;
        self.entry = Some(entry);

        if self.plant_below_stack {
            let rsp = registers.read()?.rsp;
            return Ok(Address::new(rsp - 256));
        }

        let lines: VecDeque<String> = self
            .prompt_lines
            .iter()
            .map(|line| line.replace("{entry}", &format!("{:#x}", entry)))
            .collect();
        let mut console = Console::new(lines, Vec::new());
        console.prompt_address(Some(entry))
    }

    fn on_breakpoint(&mut self, pid: Pid, registers: &Registers) -> snare_core::Result<()> {
        self.hit_pcs.push(registers.get_pc()?);

        let lines: VecDeque<String> = self.console_lines.iter().map(|s| s.to_string()).collect();
        let mut console = Console::new(lines, Vec::new());
        console.run(pid, registers)?;
        self.console_output
            .push_str(&String::from_utf8_lossy(console.output()));
        Ok(())
    }
}

fn no_args() -> Vec<String> {
    Vec::new()
}

#[test]
fn test_breakpoint_at_entry_is_hit_once() {
    let mut operator = ScriptedOperator {
        prompt_lines: vec!["{entry}"],
        console_lines: vec!["", "r", "c"],
        ..Default::default()
    };

    let mut session = Session::new(None);
    session.run("true", &no_args(), &mut operator).unwrap();

    let entry = operator.entry.expect("operator was not asked for an address");
    assert_eq!(session.address(), Some(entry));
    assert_eq!(session.hits(), 1);
    assert_eq!(operator.hit_pcs, vec![Address::new(entry.value() + 1)]);

    // レジスタ表示は修復前（アドレス+1）のRIPを示す
    let rip_line = format!("rip      0x{:016x}", entry.value() + 1);
    assert!(operator.console_output.contains(&rip_line), "{}", operator.console_output);

    // 元の命令が正しく実行され、プログラムは正常終了する
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.exit_code(), Some(0));
    assert!(session.breakpoints().installed().is_none());
}

#[test]
fn test_stop_events_are_reported_in_order() {
    let mut operator = ScriptedOperator {
        prompt_lines: vec!["{entry}"],
        console_lines: vec!["continue"],
        ..Default::default()
    };

    let mut session = Session::new(None);
    session.run("true", &no_args(), &mut operator).unwrap();

    let events = &operator.events;
    assert_eq!(events.len(), 4, "{:?}", events);
    assert_eq!(events[0].signal(), Some(Signal::SIGSTOP));
    assert!(events[1].is_exec_stop());
    assert_eq!(events[2].signal(), Some(Signal::SIGTRAP));
    assert!(events[2].trap.is_some());
    assert_eq!(events[3].exit_code(), Some(0));
}

#[test]
fn test_prompt_retries_until_valid_address() {
    let mut operator = ScriptedOperator {
        prompt_lines: vec!["", "not-an-address", "{entry}"],
        console_lines: vec!["c"],
        ..Default::default()
    };

    let mut session = Session::new(None);
    session.run("true", &no_args(), &mut operator).unwrap();

    assert_eq!(session.address(), operator.entry);
    assert_eq!(session.hits(), 1);
}

#[test]
fn test_unreached_breakpoint_terminates_cleanly() {
    let mut operator = ScriptedOperator {
        plant_below_stack: true,
        ..Default::default()
    };

    let mut session = Session::new(None);
    session.run("true", &no_args(), &mut operator).unwrap();

    assert_eq!(session.hits(), 0);
    assert!(operator.hit_pcs.is_empty());
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.exit_code(), Some(0));
    assert_eq!(session.pid(), None);

    // 終了後は ptrace を呼ばずにエラーになる
    let reported = operator.events.len();
    let err = session.step(&mut operator).unwrap_err();
    assert!(matches!(err.downcast_ref::<SessionError>(), Some(SessionError::Terminated)));
    assert_eq!(operator.events.len(), reported);
}

#[test]
fn test_exit_status_is_propagated() {
    let mut operator = ScriptedOperator {
        plant_below_stack: true,
        ..Default::default()
    };

    let mut session = Session::new(None);
    session.run("false", &no_args(), &mut operator).unwrap();
    assert_eq!(session.exit_code(), Some(1));
}

#[test]
fn test_missing_program_is_a_launch_failure() {
    let mut operator = ScriptedOperator::default();
    let mut session = Session::new(Some(Address::new(0x401000)));

    let err = session
        .run("snare-test-no-such-program", &no_args(), &mut operator)
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<SessionError>(), Some(SessionError::LaunchFailed(_))));
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(operator.events.len(), 2);
    assert_eq!(operator.events[1].exit_code(), Some(1));

    // 回収済みのPIDは手放しており、中断時にシグナルを送らない
    assert_eq!(session.pid(), None);
    assert_eq!(session.exit_code(), Some(1));
}

#[test]
fn test_unmapped_address_aborts_session() {
    let mut operator = ScriptedOperator::default();
    let mut session = Session::new(Some(Address::new(0x10)));

    assert!(session.run("true", &no_args(), &mut operator).is_err());
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.hits(), 0);
}

#[test]
fn test_launch_twice_is_rejected() {
    let mut operator = ScriptedOperator {
        plant_below_stack: true,
        ..Default::default()
    };
    let mut session = Session::new(None);
    session.run("true", &no_args(), &mut operator).unwrap();

    let err = session.launch("true", &no_args()).unwrap_err();
    assert!(matches!(err.downcast_ref::<SessionError>(), Some(SessionError::Terminated)));
}

/// 実行時に到達しない場所にブレークポイントを置いてシェルスクリプトを走らせる
fn run_shell(script: &str) -> (Session, ScriptedOperator) {
    let mut operator = ScriptedOperator {
        plant_below_stack: true,
        ..Default::default()
    };
    let mut session = Session::new(None);
    let args = vec!["-c".to_string(), script.to_string()];
    session.run("sh", &args, &mut operator).unwrap();
    (session, operator)
}

fn stops_by(operator: &ScriptedOperator, sig: Signal) -> usize {
    operator
        .events
        .iter()
        .filter(|e| e.is_signal_delivery_stop() && e.signal() == Some(sig))
        .count()
}

#[test]
fn test_other_signal_is_delivered_to_tracee() {
    let (session, operator) = run_shell("kill -USR1 $$");

    assert_eq!(stops_by(&operator, Signal::SIGUSR1), 1);
    // SIGUSR1 のデフォルト動作で終了する
    assert_eq!(session.exit_code(), Some(128 + Signal::SIGUSR1 as i32));
    assert_eq!(session.hits(), 0);
}

#[test]
fn test_other_signal_reaches_tracee_handler() {
    let (session, operator) = run_shell("trap : USR1; kill -USR1 $$; exit 3");

    assert_eq!(stops_by(&operator, Signal::SIGUSR1), 1);
    assert_eq!(session.exit_code(), Some(3));
}

#[test]
fn test_user_sent_sigtrap_is_delivered() {
    let (session, operator) = run_shell("kill -TRAP $$; exit 3");

    assert_eq!(stops_by(&operator, Signal::SIGTRAP), 1);
    assert_eq!(session.exit_code(), Some(128 + Signal::SIGTRAP as i32));
}

#[test]
fn test_second_exec_is_resumed() {
    let (session, operator) = run_shell("exec false");

    let execs = operator.events.iter().filter(|e| e.is_exec_stop()).count();
    assert_eq!(execs, 2, "{:?}", operator.events);
    assert_eq!(session.exit_code(), Some(1));
}

/// 固定アドレスにロードされる最小の静的ELF（`mov edi, 42; mov eax, 60; syscall`）
///
/// エントリは常に 0x400078 なので、起動前にアドレスを指定できる。
const STATIC_ENTRY: u64 = 0x400078;

fn static_exit42() -> PathBuf {
    let code: [u8; 12] = [
        0xbf, 0x2a, 0x00, 0x00, 0x00, // mov edi, 42
        0xb8, 0x3c, 0x00, 0x00, 0x00, // mov eax, 60 (exit)
        0x0f, 0x05, // syscall
    ];
    let base: u64 = 0x400000;
    let total = (64 + 56 + code.len()) as u64;

    let mut elf = Vec::new();
    // ELFヘッダ
    elf.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    elf.extend_from_slice(&[0; 8]);
    elf.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    elf.extend_from_slice(&0x3eu16.to_le_bytes()); // x86_64
    elf.extend_from_slice(&1u32.to_le_bytes());
    elf.extend_from_slice(&STATIC_ENTRY.to_le_bytes());
    elf.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
    elf.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    elf.extend_from_slice(&0u32.to_le_bytes());
    elf.extend_from_slice(&64u16.to_le_bytes());
    elf.extend_from_slice(&56u16.to_le_bytes());
    elf.extend_from_slice(&1u16.to_le_bytes());
    elf.extend_from_slice(&[0; 6]);
    // プログラムヘッダ（PT_LOAD, R+X）
    elf.extend_from_slice(&1u32.to_le_bytes());
    elf.extend_from_slice(&5u32.to_le_bytes());
    elf.extend_from_slice(&0u64.to_le_bytes());
    elf.extend_from_slice(&base.to_le_bytes());
    elf.extend_from_slice(&base.to_le_bytes());
    elf.extend_from_slice(&total.to_le_bytes());
    elf.extend_from_slice(&total.to_le_bytes());
    elf.extend_from_slice(&0x1000u64.to_le_bytes());
    elf.extend_from_slice(&code);
    assert_eq!(elf.len() as u64, total);

    let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("snare-exit42");
    // 既に存在すれば内容は同じなので書き直さない（実行中のファイルへの書き込みは ETXTBSY になる）
    if std::fs::read(&path).ok().as_deref() != Some(elf.as_slice()) {
        use std::os::unix::fs::PermissionsExt;
        let tmp = path.with_extension(format!("tmp{}", std::process::id()));
        std::fs::write(&tmp, &elf).unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::rename(&tmp, &path).unwrap();
    }
    path
}

#[test]
fn test_known_address_is_hit_once() {
    let program = static_exit42();
    // ETXTBSY（同時に fork された子が書き込み用fdを握っている）の場合は起動し直す
    let mut attempts = 0;
    let (session, operator) = loop {
        let mut operator = ScriptedOperator {
            console_lines: vec!["r", "c"],
            ..Default::default()
        };
        let mut session = Session::new(Some(Address::new(STATIC_ENTRY)));
        match session.run(&program, &no_args(), &mut operator) {
            Err(e)
                if attempts < 5
                    && matches!(e.downcast_ref::<SessionError>(), Some(SessionError::LaunchFailed(_))) =>
            {
                attempts += 1;
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            result => {
                result.unwrap();
                break (session, operator);
            }
        }
    };

    // アドレスは問い合わせられない
    assert_eq!(operator.entry, None);
    assert_eq!(session.hits(), 1);
    assert_eq!(operator.hit_pcs, vec![Address::new(STATIC_ENTRY + 1)]);
    // 元の mov edi, 42 がちょうど1回実行されていれば終了コードは42
    assert_eq!(session.exit_code(), Some(42));
}
