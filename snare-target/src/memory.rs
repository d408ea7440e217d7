//! メモリアクセス機能
//!
//! tracee のメモリは `/proc/pid/mem` 経由で読み書きします（peek / poke）。
//! 読み取りで `/proc/pid/mem` が EIO を返した場合は PTRACE_PEEKDATA にフォールバックします。

use crate::{Address, Result, TargetError};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::{Read as _, Seek, SeekFrom, Write as _};

/// メモリアクセス
#[derive(Debug, Clone, Copy)]
pub struct Memory {
    pid: Pid,
}

impl Memory {
    /// メモリアクセスを作成する
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    /// /proc/pid/mem のパスを取得する
    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    fn error(&self, action: &'static str, addr: Address, len: usize, reason: impl ToString) -> TargetError {
        TargetError::Memory {
            action,
            addr,
            len,
            pid: self.pid,
            reason: reason.to_string(),
        }
    }

    /// メモリから `size` バイト読み取る（peek）
    pub fn read(&self, addr: Address, size: usize) -> Result<Vec<u8>> {
        match self.read_via_proc_mem(addr, size) {
            Ok(data) => Ok(data),
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => self.read_via_ptrace(addr, size),
            Err(e) => Err(self.error("read", addr, size, e).into()),
        }
    }

    fn read_via_proc_mem(&self, addr: Address, size: usize) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(self.mem_path())?;
        file.seek(SeekFrom::Start(addr.value()))?;

        let mut buffer = vec![0u8; size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// PTRACE_PEEKDATA でword単位に読み取る
    fn read_via_ptrace(&self, addr: Address, size: usize) -> Result<Vec<u8>> {
        use nix::sys::ptrace;

        let word_size = std::mem::size_of::<nix::libc::c_long>();
        let mut data = Vec::with_capacity(size + word_size);

        for offset in (0..size).step_by(word_size) {
            let word_addr = addr.value() + offset as u64;
            let word = ptrace::read(self.pid, word_addr as ptrace::AddressType)
                .map_err(|e| self.error("read", Address::new(word_addr), word_size, e))?;
            data.extend_from_slice(&word.to_ne_bytes());
        }

        data.truncate(size);
        Ok(data)
    }

    /// メモリにデータを書き込む（poke）
    ///
    /// `/proc/pid/mem` への書き込みは、tracer であれば読み取り専用のテキストページにも行えます。
    pub fn write(&self, addr: Address, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.mem_path())
            .map_err(|e| self.error("write", addr, data.len(), e))?;

        file.seek(SeekFrom::Start(addr.value()))
            .map_err(|e| self.error("write", addr, data.len(), e))?;
        file.write_all(data)
            .map_err(|e| self.error("write", addr, data.len(), e))?;

        Ok(())
    }

    /// 1バイト読み取る
    pub fn read_u8(&self, addr: Address) -> Result<u8> {
        let bytes = self.read(addr, 1)?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| self.error("read", addr, 1, "short read").into())
    }

    /// 1バイト書き込む
    pub fn write_u8(&self, addr: Address, value: u8) -> Result<()> {
        self.write(addr, &[value])
    }
}
