//! Minimal polled PL011 UART driver.
//!
//! Backs both the panic path and the `log` facade. Deliberately has no
//! interrupt-driven RX/TX, no line discipline, and no formatter beyond
//! `core::fmt::Write` — a full console/terminal stack is out of scope.

use crate::config::UART0_BASE;
use core::fmt;

const UART0_DR: *mut u8 = UART0_BASE as *mut u8;
const UART0_FR: *const u32 = (UART0_BASE + 0x18) as *const u32;
const RXFE: u32 = 1 << 4;

unsafe fn putchar(c: u8) {
    // SAFETY: UART0_BASE is the fixed PL011 MMIO address on the QEMU virt
    // machine; it is mapped identity 1:1 by the boot-time low-2MiB region.
    unsafe {
        UART0_DR.write_volatile(c);
    }
}

/// Blocking write of a byte string to the UART, translating bare `\n` to
/// `\r\n` so a plain terminal renders output correctly.
pub fn print(s: &str) {
    for c in s.bytes() {
        if c == b'\n' {
            unsafe { putchar(b'\r') };
        }
        unsafe { putchar(c) };
    }
}

pub fn has_char() -> bool {
    // SAFETY: see `putchar`.
    unsafe { (UART0_FR.read_volatile() & RXFE) == 0 }
}

/// Blocking read of a single byte.
pub fn getchar() -> u8 {
    while !has_char() {
        core::hint::spin_loop();
    }
    // SAFETY: see `putchar`.
    unsafe { UART0_DR.read_volatile() }
}

/// `core::fmt::Write` adapter so the `log` macros can use `write!`/`writeln!`
/// without ever touching the heap.
pub struct Writer;

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        print(s);
        Ok(())
    }
}
