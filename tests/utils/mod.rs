// Integration Test Utilities
//
// Tiny static x86-64 programs assembled with gcc so that every traced
// instruction is known in advance, plus a C program built the way plain gcc
// builds it (position independent, started by libc).

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `_start` calls `f`, `f` calls `g` twice
pub const SIBLING_CALLS: &str = r#"
    .text
    .globl _start

    .type g, @function
g:
    nop
    ret
    .size g, .-g

    .type f, @function
f:
    call g
    call g
    ret
    .size f, .-f

    .type _start, @function
_start:
    call f
    mov $60, %eax
    xor %edi, %edi
    syscall
    .size _start, .-_start
"#;

/// `_start` calls `r(3)`, which recurses down to `r(0)`
pub const DIRECT_RECURSION: &str = r#"
    .text
    .globl _start

    .type r, @function
r:
    test %edi, %edi
    jz 1f
    dec %edi
    call r
1:
    ret
    .size r, .-r

    .type _start, @function
_start:
    mov $3, %edi
    call r
    mov $60, %eax
    xor %edi, %edi
    syscall
    .size _start, .-_start
"#;

/// `_start` exits straight away
pub const NO_CALLS: &str = r#"
    .text
    .globl _start

    .type _start, @function
_start:
    mov $60, %eax
    xor %edi, %edi
    syscall
    .size _start, .-_start
"#;

/// `_start` writes "hi\n" to stdout and exits with status 42
pub const WRITE_AND_EXIT_42: &str = r#"
    .section .rodata
msg:
    .ascii "hi\n"

    .text
    .globl _start

    .type _start, @function
_start:
    mov $1, %eax
    mov $1, %edi
    lea msg(%rip), %rsi
    mov $3, %edx
    syscall
    mov $60, %eax
    mov $42, %edi
    syscall
    .size _start, .-_start
"#;

/// Installs a SIGUSR1 handler, signals itself, and exits 0 after the
/// handler returns through its sigreturn trampoline
pub const SIGNAL_HANDLED: &str = r#"
    .text
    .globl _start

    .type on_signal, @function
on_signal:
    nop
    ret
    .size on_signal, .-on_signal

    .type restore, @function
restore:
    mov $15, %eax
    syscall
    .size restore, .-restore

    .type _start, @function
_start:
    sub $32, %rsp
    lea on_signal(%rip), %rax
    mov %rax, (%rsp)
    movq $0x04000000, 8(%rsp)
    lea restore(%rip), %rax
    mov %rax, 16(%rsp)
    movq $0, 24(%rsp)
    mov $13, %eax
    mov $10, %edi
    mov %rsp, %rsi
    xor %edx, %edx
    mov $8, %r10d
    syscall
    mov $39, %eax
    syscall
    mov %eax, %edi
    mov $10, %esi
    mov $62, %eax
    syscall
    mov $60, %eax
    xor %edi, %edi
    syscall
    .size _start, .-_start
"#;

/// Sends itself SIGUSR1 with the default action and dies from it
pub const KILLED_BY_SIGNAL: &str = r#"
    .text
    .globl _start

    .type _start, @function
_start:
    mov $39, %eax
    syscall
    mov %eax, %edi
    mov $10, %esi
    mov $62, %eax
    syscall
    mov $60, %eax
    xor %edi, %edi
    syscall
    .size _start, .-_start
"#;

/// `main` calls `f`, `f` calls `g` twice
pub const C_SIBLING_CALLS: &str = r#"
__attribute__((noinline)) int g(int x) { return x + 1; }

__attribute__((noinline)) int f(int x) { return g(x) + g(x); }

int main(void) { return f(1) == 4 ? 0 : 1; }
"#;

/// Assemble `source` into a static, non-PIE executable inside `dir`
pub fn assemble(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let source_file = dir.path().join(format!("{name}.s"));
    let program = dir.path().join(name);
    fs::write(&source_file, source).unwrap();

    let output = std::process::Command::new("gcc")
        .args(["-nostdlib", "-static", "-no-pie", "-o"])
        .arg(&program)
        .arg(&source_file)
        .output()
        .expect("Failed to run gcc");
    assert!(
        output.status.success(),
        "gcc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    program
}

/// Compile C `source` into a default position-independent executable
/// inside `dir`
pub fn compile_pie(dir: &Path, name: &str, source: &str) -> PathBuf {
    let source_file = dir.join(format!("{name}.c"));
    let program = dir.join(name);
    fs::write(&source_file, source).unwrap();

    let output = std::process::Command::new("gcc")
        .args(["-O0", "-fno-inline", "-fPIE", "-pie", "-o"])
        .arg(&program)
        .arg(&source_file)
        .output()
        .expect("Failed to run gcc");
    assert!(
        output.status.success(),
        "gcc failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    program
}

/// Split a rendered line like `    f [rec call: 2]: 17` into
/// `(depth, name, count)`
pub fn parse_line(line: &str) -> (usize, &str, u64) {
    let trimmed = line.trim_start();
    let depth = (line.len() - trimmed.len()) / 4;
    let (name, count) = trimmed.rsplit_once(": ").unwrap();
    (depth, name, count.parse().unwrap())
}
