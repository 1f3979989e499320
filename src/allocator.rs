//! Global allocator for incidental heap use.
//!
//! No core data structure in this kernel is heap-allocated: the frame
//! allocator, VmArea pool, and task table are all fixed-size statics. This
//! backs only incidental allocation (formatted panic/log messages and the
//! like) with a `talc` arena claimed from a static region, matching how the
//! teacher wires `talc` up, minus the page-based allocator path this kernel
//! has no use for.

use crate::config::HEAP_SIZE;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use spinning_top::Spinlock;
use talc::{ErrOnOom, Span, Talc};

static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

static TALC: Spinlock<Talc<ErrOnOom>> = Spinlock::new(Talc::new(ErrOnOom));

struct KernelAllocator;

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator;

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe {
            TALC.lock()
                .malloc(layout)
                .map(|p| p.as_ptr())
                .unwrap_or(ptr::null_mut())
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe {
            TALC.lock()
                .free(core::ptr::NonNull::new_unchecked(ptr), layout);
        }
    }
}

/// Claim the static heap region. Must run once, before any allocation.
pub fn init() {
    unsafe {
        let heap_ptr = core::ptr::addr_of_mut!(HEAP) as *mut u8;
        let span = Span::from_base_size(heap_ptr, HEAP_SIZE);
        TALC.lock()
            .claim(span)
            .expect("failed to claim kernel heap");
    }
}
