//! Kernel configuration constants.
//!
//! Every tunable the core subsystems need lives here. Modify these values to
//! adjust kernel behavior; nothing below this module should hardcode a size
//! or address that belongs to frame allocation, paging, or scheduling.

#![allow(dead_code)]

/// Page size in bytes. Fixed by the 4 KiB granule chosen in TCR_EL1.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: usize = 12;

/// Physical base address of RAM. The frame allocator's whole tracked PFN
/// range sits at `KERNEL_PHYS_BASE + (pfn << PAGE_SHIFT)` — never at PFN *
/// PAGE_SIZE directly — so it never overlaps the MMIO window below RAM
/// (`GIC_DIST_BASE`/`GIC_CPU_BASE`/`UART0_BASE` all live in
/// `0x0000_0000..KERNEL_PHYS_BASE`). Also where `boot` loads the kernel
/// image and where `_boot` sets up its initial stack.
pub const KERNEL_PHYS_BASE: usize = 0x4000_0000;

/// Total number of 4 KiB physical frames tracked by the frame allocator.
/// 262144 frames * 4 KiB = 1 GiB of tracked RAM, starting at
/// `KERNEL_PHYS_BASE`.
pub const VM_MAX_PAGES: usize = 262144;

/// Frames [0, RESERVED_PAGES) cover the start of RAM occupied by the kernel
/// image itself (text/data/bss loaded at `KERNEL_PHYS_BASE`); the allocator
/// never hands them out.
pub const RESERVED_PAGES: usize = 1024;

/// Capacity of the static VmArea descriptor pool.
pub const VM_AREA_POOL_SIZE: usize = 1024;

/// Physical address of the L0 (root) translation table, published by Boot
/// via `set_page_table_base` and consumed by every subsequent page table
/// walk.
pub const ROOT_TABLE_BASE: usize = 0x1000;

/// Entries per translation table (512 for a 4 KiB granule, 48-bit VA).
pub const ENTRIES_PER_TABLE: usize = 512;
pub const BITS_PER_LEVEL: u32 = 9;

/// Fixed-capacity task table size. The spec requires at least 64; slot 0 is
/// permanently reserved for the idle task.
pub const MAX_TASKS: usize = 64;

/// Each task, including idle, gets exactly one 4 KiB frame as its stack.
pub const TASK_STACK_SIZE: usize = PAGE_SIZE;

/// Target tick period for the periodic preemption timer, in microseconds.
/// At 1000us the scheduler's `sleep_until` comparisons are directly in
/// milliseconds, matching the spec's assumed ~1 kHz tick source.
pub const TIMER_INTERVAL_US: u64 = 1000;

/// PL011 UART base address, QEMU `virt` machine convention.
pub const UART0_BASE: usize = 0x0900_0000;

/// GICv2 distributor and CPU interface base addresses, QEMU `virt` machine
/// convention.
pub const GIC_DIST_BASE: usize = 0x0800_0000;
pub const GIC_CPU_BASE: usize = 0x0801_0000;

/// IRQ line the ARM generic physical timer (CNTP) is wired to on the
/// QEMU `virt` machine's GIC.
pub const TIMER_IRQ: u32 = 30;

/// Size of the heap region handed to the ambient global allocator. This
/// backs only incidental non-core allocation (e.g. panic message
/// formatting); no core data structure is heap-allocated.
pub const HEAP_SIZE: usize = 256 * 1024;
