#![no_std]
#![no_main]

extern crate alloc;

mod allocator;
mod boot;
mod config;
mod console;
mod error;
mod exceptions;
mod frame;
mod gic;
mod irq;
mod log;
mod pagetable;
mod sched;
mod timer;
mod vm;
mod vmarea;

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    error!("panic: {}", info);
    loop {
        irq::with_irqs_disabled(|| {});
    }
}

/// Common divergence point for any unrecoverable kernel-internal fault, e.g.
/// a W^X violation or an EL1 memory abort. Distinct from the panic handler:
/// this is reached deliberately from subsystem code, not from Rust's own
/// panic machinery.
pub fn kernel_panic(msg: &str) -> ! {
    error!("kernel panic: {}", msg);
    loop {
        irq::with_irqs_disabled(|| {});
    }
}

/// Entry point from the boot assembly once the MMU is on and the initial
/// stack is live. `_dtb` is the device tree blob pointer passed in x0 by
/// the bootloader; nothing here parses it yet.
#[unsafe(no_mangle)]
extern "C" fn rust_start(_dtb: usize) -> ! {
    allocator::init();
    exceptions::init();
    gic::init();

    vm::vm_init();
    sched::sched_init();

    gic::enable_timer_irq(config::TIMER_IRQ);
    timer::init();

    kernel_main();
}

/// Smoke-test body: map a fresh page, write through it, and idle. Grounded
/// on the minimal original boot-to-idle sequence this core was distilled
/// from, adapted to an address outside the boot-time identity-mapped
/// window so `vm_map` has to allocate its own L3 table.
fn kernel_main() -> ! {
    let page = vm::alloc_page();
    if page != 0 {
        let va = 0x4400_0000usize;
        if vm::vm_map(va, page, vmarea::PROT_READ | vmarea::PROT_WRITE) == 0 {
            let dest = va as *mut u8;
            unsafe {
                core::ptr::write(dest, b'H');
                core::ptr::write(dest.add(1), b'I');
                core::ptr::write(dest.add(2), 0);
            }
        }
    }

    info!("kernel ready");

    loop {
        wait_for_interrupt();
    }
}

#[cfg(target_arch = "aarch64")]
fn wait_for_interrupt() {
    unsafe { core::arch::asm!("wfi") };
}

#[cfg(not(target_arch = "aarch64"))]
fn wait_for_interrupt() {}
