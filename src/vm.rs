//! VM facade: composes the frame allocator, the VmArea pool, and the page
//! table walker into `vm_map` / `vm_unmap` / `vm_protect`, enforcing W⊕X.
//!
//! This is the only module external callers (drivers, the boot sequence)
//! touch; `frame`, `vmarea`, and `pagetable` are internal collaborators.

use crate::config::{PAGE_SIZE, ROOT_TABLE_BASE};
use crate::error::{to_sentinel, KernelError};
use crate::pagetable::{decompose, encode_leaf, get_or_alloc, leaf_phys, read_entry, write_entry};
use crate::vmarea::{VmAreaPool, PROT_EXEC, PROT_WRITE, VM_AREA_WAS_EXEC, VM_AREA_WAS_WRITE};
use spinning_top::Spinlock;

struct Vm {
    areas: VmAreaPool,
    area_head: Option<u16>,
    root_table: usize,
}

impl Vm {
    const fn new() -> Self {
        Self {
            areas: VmAreaPool::new(),
            area_head: None,
            root_table: 0,
        }
    }

    fn init(&mut self) {
        crate::frame::init();
        self.areas = VmAreaPool::new();
        self.area_head = None;
        self.root_table = ROOT_TABLE_BASE;
    }

    fn set_root(&mut self, root_phys: usize) {
        self.root_table = root_phys;
    }

    fn find_area(&self, addr: usize) -> Option<u16> {
        let mut cur = self.area_head;
        while let Some(idx) = cur {
            let area = self.areas.get(idx);
            if area.contains(addr) {
                return Some(idx);
            }
            cur = area.next;
        }
        None
    }

    fn unlink_area(&mut self, addr: usize) -> bool {
        let mut prev: Option<u16> = None;
        let mut cur = self.area_head;
        while let Some(idx) = cur {
            let next = self.areas.get(idx).next;
            if self.areas.get(idx).contains(addr) {
                match prev {
                    Some(p) => self.areas.get_mut(p).next = next,
                    None => self.area_head = next,
                }
                self.areas.free(idx);
                return true;
            }
            prev = Some(idx);
            cur = next;
        }
        false
    }

    fn map(&mut self, va: usize, pa: usize, prot: u32) -> Result<(), KernelError> {
        if va % PAGE_SIZE != 0 || pa % PAGE_SIZE != 0 {
            return Err(KernelError::InvalidArgument("unaligned address in vm_map"));
        }
        if self.root_table == 0 {
            return Err(KernelError::InvalidArgument("root table not installed"));
        }

        let idx = self.areas.alloc().ok_or(KernelError::OutOfMemory)?;
        {
            let area = self.areas.get_mut(idx);
            area.start = va;
            area.end = va + PAGE_SIZE;
            area.prot = prot;
            area.wx_flags = (if prot & PROT_EXEC != 0 { VM_AREA_WAS_EXEC } else { 0 })
                | (if prot & PROT_WRITE != 0 { VM_AREA_WAS_WRITE } else { 0 });
            area.next = self.area_head;
        }

        let walked = self.walk_for_write(va);
        let l3_table = match walked {
            Some(t) => t,
            None => {
                self.areas.free(idx);
                return Err(KernelError::OutOfMemory);
            }
        };

        let idxs = decompose(va);
        let entry = encode_leaf(pa, prot);
        write_entry(l3_table, idxs.l3, entry);
        crate::pagetable::invalidate_va(va);

        self.area_head = Some(idx);
        Ok(())
    }

    /// Walk L0->L1->L2, allocating intermediate tables, and return the L3
    /// table's physical address.
    fn walk_for_write(&mut self, va: usize) -> Option<usize> {
        let idxs = decompose(va);
        let l1 = get_or_alloc(self.root_table, idxs.l0, true)?;
        let l2 = get_or_alloc(l1, idxs.l1, true)?;
        get_or_alloc(l2, idxs.l2, true)
    }

    /// Walk without allocating; used by unmap/protect.
    fn walk_readonly(&self, va: usize) -> Option<usize> {
        let idxs = decompose(va);
        let l1 = get_or_alloc(self.root_table, idxs.l0, false)?;
        let l2 = get_or_alloc(l1, idxs.l1, false)?;
        get_or_alloc(l2, idxs.l2, false)
    }

    fn unmap(&mut self, va: usize) -> Result<(), KernelError> {
        let l3_table = self
            .walk_readonly(va)
            .ok_or(KernelError::InvalidArgument("vm_unmap: no mapping"))?;

        let idxs = decompose(va);
        write_entry(l3_table, idxs.l3, 0);
        crate::pagetable::invalidate_va(va);

        self.unlink_area(va);
        Ok(())
    }

    fn protect(&mut self, va: usize, new_prot: u32) -> Result<(), KernelError> {
        let idx = self
            .find_area(va)
            .ok_or(KernelError::InvalidArgument("vm_protect: no such area"))?;

        if would_violate_wx(new_prot, self.areas.get(idx).wx_flags) {
            crate::kernel_panic(
                "W^X violation: attempted to make an ever-writable page executable",
            );
        }

        let l3_table = self
            .walk_readonly(va)
            .ok_or(KernelError::InvalidArgument("vm_protect: table absent"))?;

        let idxs = decompose(va);
        let old = read_entry(l3_table, idxs.l3);
        if old & 1 == 0 {
            return Err(KernelError::InvalidArgument("vm_protect: PTE not valid"));
        }

        let phys = leaf_phys(old);
        let new_entry = encode_leaf(phys, new_prot);
        write_entry(l3_table, idxs.l3, new_entry);
        crate::pagetable::invalidate_va(va);

        let area = self.areas.get_mut(idx);
        area.prot = new_prot;
        area.wx_flags |= (if new_prot & PROT_EXEC != 0 { VM_AREA_WAS_EXEC } else { 0 })
            | (if new_prot & PROT_WRITE != 0 { VM_AREA_WAS_WRITE } else { 0 });

        Ok(())
    }
}

/// Pure predicate behind `protect`'s W^X trap: true if `new_prot` would make
/// executable an area that was ever writable. Split out so the trap
/// condition itself is testable without going through `kernel_panic`, which
/// never returns.
fn would_violate_wx(new_prot: u32, wx_flags: u32) -> bool {
    new_prot & PROT_EXEC != 0 && wx_flags & VM_AREA_WAS_WRITE != 0
}

static VM: Spinlock<Vm> = Spinlock::new(Vm::new());

pub fn vm_init() {
    VM.lock().init();
}

pub fn set_page_table_base(root_phys: usize) {
    VM.lock().set_root(root_phys);
}

pub fn alloc_page() -> usize {
    crate::frame::alloc_page()
}

pub fn alloc_pages(n: usize) -> usize {
    crate::frame::alloc_pages(n)
}

pub fn free_page(phys: usize) {
    crate::frame::free_page(phys);
}

pub fn free_pages(phys: usize, n: usize) {
    crate::frame::free_pages(phys, n);
}

pub fn get_free_pages() -> usize {
    crate::frame::get_free_pages()
}

pub fn get_total_pages() -> usize {
    crate::frame::get_total_pages()
}

pub fn vm_map(virt: usize, phys: usize, prot: u32) -> i32 {
    to_sentinel(VM.lock().map(virt, phys, prot))
}

pub fn vm_unmap(virt: usize) -> i32 {
    to_sentinel(VM.lock().unmap(virt))
}

pub fn vm_protect(virt: usize, prot: u32) -> i32 {
    to_sentinel(VM.lock().protect(virt, prot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENTRIES_PER_TABLE;
    use crate::pagetable::{leaf_prot, Pte};
    use crate::vmarea::PROT_READ;
    use alloc::boxed::Box;

    /// A table-sized, table-aligned chunk of backing memory. `get_or_alloc`
    /// masks a descriptor's low 12 bits off as flags, so every table `map`
    /// walks through here must sit on a 4 KiB boundary the way a real
    /// frame-allocated table would.
    #[repr(align(4096))]
    struct Table([u64; ENTRIES_PER_TABLE]);

    impl Table {
        fn boxed() -> Box<Table> {
            Box::new(Table([0; ENTRIES_PER_TABLE]))
        }

        fn addr(&self) -> usize {
            self.0.as_ptr() as usize
        }
    }

    fn table_descriptor(addr: usize) -> u64 {
        addr as u64 | Pte::VALID.bits() | Pte::TABLE.bits()
    }

    /// A fully pre-linked L0->L1->L2->L3 chain for VA 0 (every index is 0),
    /// so `walk_for_write` never has to call into the global frame allocator
    /// for a new table — it only ever follows descriptors this test already
    /// installed.
    struct Chain {
        root: Box<Table>,
        _l1: Box<Table>,
        _l2: Box<Table>,
        l3: Box<Table>,
    }

    impl Chain {
        fn build() -> Self {
            let root = Table::boxed();
            let l1 = Table::boxed();
            let l2 = Table::boxed();
            let l3 = Table::boxed();
            write_entry(root.addr(), 0, table_descriptor(l1.addr()));
            write_entry(l1.addr(), 0, table_descriptor(l2.addr()));
            write_entry(l2.addr(), 0, table_descriptor(l3.addr()));
            Self { root, _l1: l1, _l2: l2, l3 }
        }

        fn l3_entry(&self, idx: usize) -> u64 {
            read_entry(self.l3.addr(), idx)
        }
    }

    fn fresh_vm(root: usize) -> Vm {
        Vm {
            areas: VmAreaPool::new(),
            area_head: None,
            root_table: root,
        }
    }

    #[test]
    fn map_then_unmap_round_trips() {
        let chain = Chain::build();
        let mut vm = fresh_vm(chain.root.addr());
        let va = 0usize;
        let pa = 0x1000usize;

        assert_eq!(vm.map(va, pa, PROT_READ | PROT_WRITE), Ok(()));
        let entry = chain.l3_entry(decompose(va).l3);
        assert_eq!(leaf_phys(entry), pa);
        assert!(vm.find_area(va).is_some());

        assert_eq!(vm.unmap(va), Ok(()));
        assert_eq!(chain.l3_entry(decompose(va).l3), 0);
        assert!(vm.find_area(va).is_none());
    }

    #[test]
    fn remap_after_unmap_leaves_no_residual_state() {
        let chain = Chain::build();
        let mut vm = fresh_vm(chain.root.addr());
        let va = 0usize;

        vm.map(va, 0x1000, PROT_READ).unwrap();
        vm.unmap(va).unwrap();
        vm.map(va, 0x2000, PROT_READ | PROT_WRITE).unwrap();

        let entry = chain.l3_entry(decompose(va).l3);
        assert_eq!(leaf_phys(entry), 0x2000);
        assert_eq!(leaf_prot(entry) & PROT_WRITE, PROT_WRITE);
    }

    #[test]
    fn unaligned_va_rejected_without_touching_tables() {
        let chain = Chain::build();
        let mut vm = fresh_vm(chain.root.addr());

        let result = vm.map(1, 0x1000, PROT_READ);
        assert_eq!(
            result,
            Err(KernelError::InvalidArgument("unaligned address in vm_map"))
        );
        assert_eq!(chain.l3_entry(0), 0);
        assert!(vm.area_head.is_none());
    }

    #[test]
    fn wx_violation_is_detected_for_ever_writable_areas() {
        assert!(would_violate_wx(PROT_EXEC, VM_AREA_WAS_WRITE));
        assert!(!would_violate_wx(PROT_EXEC, VM_AREA_WAS_EXEC));
        assert!(!would_violate_wx(PROT_READ, VM_AREA_WAS_WRITE));
    }

    #[test]
    fn protect_permitted_transition_updates_pte_and_area() {
        let chain = Chain::build();
        let mut vm = fresh_vm(chain.root.addr());
        let va = 0usize;

        vm.map(va, 0x1000, PROT_READ | PROT_EXEC).unwrap();
        assert_eq!(vm.protect(va, PROT_READ), Ok(()));

        let entry = chain.l3_entry(decompose(va).l3);
        assert_eq!(leaf_prot(entry) & PROT_EXEC, 0);

        let idx = vm.find_area(va).unwrap();
        assert_eq!(vm.areas.get(idx).prot, PROT_READ);
    }
}
