//! ARM generic physical timer (CNTP), the hardware source for the periodic
//! `timer_tick`. No RTC, no wall-clock, no date formatting — the core only
//! needs a monotonic tick counter advancing at `TIMER_INTERVAL_US`.
//!
//! CNTP is used here, not CNTV, so that anything built on top of this core
//! that needs its own async timing can use the virtual timer without
//! contending with scheduler preemption.

use crate::config::TIMER_INTERVAL_US;
use spinning_top::Spinlock;

static TICK_COUNT: Spinlock<u64> = Spinlock::new(0);

pub fn get_ticks() -> u64 {
    *TICK_COUNT.lock()
}

fn advance_tick() {
    let mut t = TICK_COUNT.lock();
    *t = t.wrapping_add(1);
}

#[cfg(target_arch = "aarch64")]
fn read_counter() -> u64 {
    let counter: u64;
    unsafe { core::arch::asm!("mrs {}, cntpct_el0", out(reg) counter) };
    counter
}

#[cfg(target_arch = "aarch64")]
fn read_frequency() -> u64 {
    let freq: u64;
    unsafe { core::arch::asm!("mrs {}, cntfrq_el0", out(reg) freq) };
    freq
}

#[cfg(not(target_arch = "aarch64"))]
fn read_counter() -> u64 {
    0
}

#[cfg(not(target_arch = "aarch64"))]
fn read_frequency() -> u64 {
    1
}

fn interval_ticks() -> u64 {
    let freq = read_frequency();
    (freq * TIMER_INTERVAL_US) / 1_000_000
}

#[cfg(target_arch = "aarch64")]
fn arm_next_deadline() {
    let deadline = read_counter() + interval_ticks();
    unsafe {
        core::arch::asm!("msr cntp_cval_el0, {}", in(reg) deadline);
        core::arch::asm!("msr cntp_ctl_el0, {}", in(reg) 1u64);
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn arm_next_deadline() {}

/// Program CNTP_CVAL/CNTP_CTL so the first interrupt fires one interval
/// from now, and enable the timer.
pub fn init() {
    arm_next_deadline();
}

/// Called from the IRQ handler. Reprograms the next compare value, advances
/// the software tick counter, and invokes `sched::timer_tick`.
pub fn timer_irq_handler() {
    arm_next_deadline();
    advance_tick();
    crate::sched::timer_tick();
}
