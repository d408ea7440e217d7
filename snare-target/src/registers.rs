//! レジスタアクセス機能

use crate::{Address, Result, TargetError};
use nix::libc::user_regs_struct;
use nix::unistd::Pid;
use std::fmt;

/// レジスタアクセス
///
/// tracee が停止している間だけ有効です。走行中に呼ぶと ptrace が ESRCH を返し、
/// エラーとして呼び出し元に伝播します。
#[derive(Debug, Clone, Copy)]
pub struct Registers {
    pid: Pid,
}

impl Registers {
    /// レジスタアクセスを作成する
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// レジスタを読み取る
    pub fn read(&self) -> Result<user_regs_struct> {
        let regs = nix::sys::ptrace::getregs(self.pid)
            .map_err(TargetError::trace("PTRACE_GETREGS", self.pid))?;
        Ok(regs)
    }

    /// レジスタに書き込む
    pub fn write(&self, regs: user_regs_struct) -> Result<()> {
        nix::sys::ptrace::setregs(self.pid, regs)
            .map_err(TargetError::trace("PTRACE_SETREGS", self.pid))?;
        Ok(())
    }

    /// プログラムカウンタ（RIP）を取得する
    pub fn get_pc(&self) -> Result<Address> {
        let regs = self.read()?;
        Ok(Address::new(regs.rip))
    }

    /// プログラムカウンタ（RIP）を設定する
    pub fn set_pc(&self, pc: Address) -> Result<()> {
        let mut regs = self.read()?;
        regs.rip = pc.value();
        self.write(regs)
    }

    /// 全レジスタを表示用に読み取る
    pub fn dump(&self) -> Result<RegisterDump> {
        self.read().map(RegisterDump)
    }
}

/// 汎用レジスタの表示
pub struct RegisterDump(pub user_regs_struct);

impl fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.0;
        let rows: [(&str, u64); 27] = [
            ("rip", r.rip),
            ("rax", r.rax),
            ("rbx", r.rbx),
            ("rcx", r.rcx),
            ("rdx", r.rdx),
            ("rsi", r.rsi),
            ("rdi", r.rdi),
            ("rbp", r.rbp),
            ("rsp", r.rsp),
            ("r8", r.r8),
            ("r9", r.r9),
            ("r10", r.r10),
            ("r11", r.r11),
            ("r12", r.r12),
            ("r13", r.r13),
            ("r14", r.r14),
            ("r15", r.r15),
            ("orig_rax", r.orig_rax),
            ("eflags", r.eflags),
            ("cs", r.cs),
            ("ss", r.ss),
            ("ds", r.ds),
            ("es", r.es),
            ("fs", r.fs),
            ("gs", r.gs),
            ("fs_base", r.fs_base),
            ("gs_base", r.gs_base),
        ];

        for (name, value) in rows {
            writeln!(f, "{:<9}0x{:016x}", name, value)?;
        }
        Ok(())
    }
}
