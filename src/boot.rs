//! Boot sequence for AArch64.
//!
//! Builds the genuine 4-level translation hierarchy in place at four fixed
//! physical addresses inside the allocator's reserved range (frames
//! `[0, RESERVED_PAGES)`), switches the MMU on over it, then hands off to
//! Rust. The same L0 table this code builds at `0x1000` is the table the VM
//! subsystem keeps using afterward — there is no second "real" table built
//! later, only further `L2`/`L3` entries populated on demand by
//! `pagetable::get_or_alloc` as `vm_map` is called.
//!
//! Regions block-mapped here, before the MMU is on, so physical and virtual
//! addresses still coincide:
//!   - `0x0000_0000..0x4000_0000`: device (GIC, UART), one 1 GiB L1 block.
//!   - `0x4000_0000..0x4020_0000`: the first 2 MiB of the kernel RAM window,
//!     walked the full four levels down to a real L3 table of 4 KiB page
//!     leaves (`L0[0]→L1`, `L1[1]→L2`, `L2[0]→L3`), so that window is
//!     indistinguishable from memory `vm_map` would itself have mapped.
//!   - `0x4020_0000..0x4400_0000`: the rest of the kernel image and early
//!     stack, 31 2 MiB L2 blocks, leaving the remainder of that 1 GiB window
//!     as plain invalid L2 entries for `vm_map` to fill in with its own
//!     dynamically allocated L3 tables.

#[cfg(target_arch = "aarch64")]
use core::arch::global_asm;

#[cfg(target_arch = "aarch64")]
global_asm!(
    r#"
.section .text._boot
.global _boot

.equ KERNEL_PHYS_BASE,  0x40000000
.equ STACK_SIZE,        0x100000

.equ L0_TABLE,          0x1000
.equ L1_TABLE,          0x2000
.equ L2_TABLE,          0x3000
.equ L3_TABLE,          0x4000
.equ L2_BLOCKS_MAPPED,  31              // 31 * 2MB, starting at L2[1] (62MB)
.equ L3_PAGES_MAPPED,   512             // 512 * 4KB = 2MB, all of L3_TABLE

.equ PAGE_SIZE,         4096

.equ PT_VALID,          (1 << 0)
.equ PT_TABLE,          (1 << 1)
.equ PT_BLOCK,          (0 << 1)
.equ PT_PAGE,           (1 << 1)
.equ PT_AF,             (1 << 10)
.equ PT_SH_INNER,       (3 << 8)
.equ PT_SH_OUTER,       (2 << 8)
.equ PT_ATTR_DEVICE,    (0 << 2)
.equ PT_ATTR_NORMAL,    (3 << 2)

.equ DEVICE_BLOCK, (PT_VALID | PT_BLOCK | PT_AF | PT_SH_OUTER | PT_ATTR_DEVICE)
.equ NORMAL_BLOCK, (PT_VALID | PT_BLOCK | PT_AF | PT_SH_INNER | PT_ATTR_NORMAL)
.equ NORMAL_PAGE,  (PT_VALID | PT_PAGE  | PT_AF | PT_SH_INNER | PT_ATTR_NORMAL)

_boot:
    mov     x19, x0                 // save DTB pointer

    mov     x0, #(3 << 20)          // enable FP/SIMD
    msr     cpacr_el1, x0
    isb

    ldr     x0, =KERNEL_PHYS_BASE
    add     x0, x0, #STACK_SIZE
    mov     sp, x0

    bl      setup_boot_page_tables
    bl      configure_mmu_regs

    mrs     x0, sctlr_el1
    orr     x0, x0, #1
    orr     x0, x0, #(1 << 2)
    orr     x0, x0, #(1 << 12)
    msr     sctlr_el1, x0
    isb

    mov     x0, x19
    bl      rust_start

hang:
    wfe
    b       hang

.section .text.boot
setup_boot_page_tables:
    mov     x10, #L0_TABLE
    mov     x11, #L1_TABLE
    mov     x13, #L2_TABLE
    mov     x17, #L3_TABLE

    // clear all four tables (16KB)
    mov     x0, x10
    mov     x1, #(PAGE_SIZE * 4)
3:  str     xzr, [x0], #8
    subs    x1, x1, #8
    b.ne    3b

    // L0[0] -> L1_TABLE
    mov     x0, x11
    orr     x0, x0, #(PT_VALID | PT_TABLE)
    str     x0, [x10, #0]

    // L1[0] = 0x0000_0000..0x3FFF_FFFF, device, 1GB block
    ldr     x0, =DEVICE_BLOCK
    str     x0, [x11, #0]

    // L1[1] -> L2_TABLE (kernel RAM window, fine-grained)
    mov     x0, x13
    orr     x0, x0, #(PT_VALID | PT_TABLE)
    str     x0, [x11, #8]

    // L2[0] -> L3_TABLE: the first 2MB of RAM is walked the full four
    // levels, not block-mapped, so it looks exactly like a region vm_map
    // itself would have built.
    mov     x0, x17
    orr     x0, x0, #(PT_VALID | PT_TABLE)
    str     x0, [x13, #0]

    // Populate L3_TABLE with L3_PAGES_MAPPED 4KB page leaves, identity
    // mapping KERNEL_PHYS_BASE..KERNEL_PHYS_BASE+0x200000.
    mov     x14, #0
    ldr     x15, =NORMAL_PAGE
    ldr     x16, =KERNEL_PHYS_BASE
5:  mov     x0, x16
    orr     x0, x0, x15
    str     x0, [x17, x14, lsl #3]
    add     x16, x16, #PAGE_SIZE
    add     x14, x14, #1
    cmp     x14, #L3_PAGES_MAPPED
    b.lt    5b

    // Populate L2[1..1+L2_BLOCKS_MAPPED] as 2MB normal-memory blocks
    // covering the rest of the kernel image; the remainder of the table is
    // left zeroed for vm_map to claim later.
    mov     x14, #1
    ldr     x15, =NORMAL_BLOCK
    ldr     x16, =KERNEL_PHYS_BASE
    add     x16, x16, #0x200000
4:  mov     x0, x16
    orr     x0, x0, x15
    str     x0, [x13, x14, lsl #3]
    add     x16, x16, #0x200000
    add     x14, x14, #1
    cmp     x14, #(1 + L2_BLOCKS_MAPPED)
    b.lt    4b

    ret

configure_mmu_regs:
    // MAIR_EL1: Attr0=Device-nGnRnE, Attr1=Normal NC, Attr2=Normal WT, Attr3=Normal WB
    mov     x0, #0x4400
    movk    x0, #0xFFBB, lsl #16
    msr     mair_el1, x0

    // TCR_EL1: T0SZ=T1SZ=16 (48-bit VA), TG0=TG1=4KB, IPS=48-bit PA,
    // SH0=SH1=inner shareable, ORGN/IRGN=write-back
    mov     x0, #0x3510
    movk    x0, #0xB510, lsl #16
    movk    x0, #0x5, lsl #32
    msr     tcr_el1, x0

    mov     x0, #L0_TABLE
    msr     ttbr0_el1, x0
    msr     ttbr1_el1, x0

    tlbi    vmalle1
    dsb     sy
    isb

    ret
"#
);

#[cfg(not(target_arch = "aarch64"))]
pub fn rust_start_stub() {}
