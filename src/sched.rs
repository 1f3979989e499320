//! Priority round-robin task scheduler with sleep.
//!
//! Reuses the teacher's general approach to context switching (a tiny
//! `global_asm!` routine saving/restoring callee-saved registers and the
//! stack pointer) but follows the reference scheduling algorithm exactly:
//! a fixed task table, a singly-linked circular ready ring, strictly-
//! greatest-priority selection with insertion-order tie-break, and a sleep
//! queue swept inside `schedule`.
//!
//! Unlike the teacher's `Context`, this one carries no DAIF snapshot — the
//! global interrupt-enable state is uniform across tasks here, not part of
//! per-task state (see DESIGN.md).

use crate::config::{MAX_TASKS, TASK_STACK_SIZE};
use crate::irq::IrqGuard;
use spinning_top::Spinlock;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Dead,
    Ready,
    Running,
    Sleeping,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Context {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    pub x29: u64, // frame pointer
    pub x30: u64, // link register / entry point on first switch
    pub sp: u64,
}

impl Context {
    const fn zero() -> Self {
        Self {
            x19: 0,
            x20: 0,
            x21: 0,
            x22: 0,
            x23: 0,
            x24: 0,
            x25: 0,
            x26: 0,
            x27: 0,
            x28: 0,
            x29: 0,
            x30: 0,
            sp: 0,
        }
    }
}

#[derive(Clone, Copy)]
struct Task {
    tid: u32,
    state: TaskState,
    priority: u32,
    time_slice: u32,
    stack_base: usize,
    sleep_until: u64,
    ctx: Context,
    next: Option<u8>,
}

impl Task {
    const fn empty() -> Self {
        Self {
            tid: 0,
            state: TaskState::Dead,
            priority: 0,
            time_slice: 0,
            stack_base: 0,
            sleep_until: 0,
            ctx: Context::zero(),
            next: None,
        }
    }
}

extern "C" fn idle_loop() -> ! {
    loop {
        idle_wait();
    }
}

#[cfg(target_arch = "aarch64")]
fn idle_wait() {
    unsafe { core::arch::asm!("wfi", options(nostack)) };
}

#[cfg(not(target_arch = "aarch64"))]
fn idle_wait() {}

struct Scheduler {
    tasks: [Task; MAX_TASKS],
    current: Option<u8>,
    ready_head: Option<u8>,
    next_tid: u32,
    tick_count: u64,
}

impl Scheduler {
    const fn new() -> Self {
        Self {
            tasks: [Task::empty(); MAX_TASKS],
            current: None,
            ready_head: None,
            next_tid: 1,
            tick_count: 0,
        }
    }

    fn enqueue(&mut self, t: u8) {
        match self.ready_head {
            None => {
                self.tasks[t as usize].next = Some(t);
                self.ready_head = Some(t);
            }
            Some(head) => {
                self.tasks[t as usize].next = self.tasks[head as usize].next;
                self.tasks[head as usize].next = Some(t);
            }
        }
    }

    /// Remove `t` from the ready ring. `t` need not be `ready_head`.
    fn unlink(&mut self, t: u8) {
        let Some(head) = self.ready_head else { return };
        if head == t && self.tasks[head as usize].next == Some(head) {
            // sole entry
            self.tasks[head as usize].next = None;
            self.ready_head = None;
            return;
        }
        let mut cur = head;
        loop {
            let next = self.tasks[cur as usize].next.unwrap();
            if next == t {
                let after = self.tasks[t as usize].next.unwrap();
                self.tasks[cur as usize].next = Some(after);
                if self.ready_head == Some(t) {
                    self.ready_head = Some(after);
                }
                self.tasks[t as usize].next = None;
                return;
            }
            cur = next;
            if cur == head {
                return;
            }
        }
    }

    fn init(&mut self) {
        self.tasks = [Task::empty(); MAX_TASKS];
        for t in self.tasks.iter_mut() {
            t.state = TaskState::Dead;
        }

        let stack = crate::frame::alloc_page();
        if stack == 0 {
            crate::kernel_panic("sched_init: failed to allocate idle stack");
        }

        let idle = &mut self.tasks[0];
        idle.tid = 0;
        idle.state = TaskState::Running;
        idle.priority = 0;
        idle.time_slice = 1;
        idle.stack_base = stack;
        idle.ctx = Context::zero();
        idle.ctx.sp = (stack + TASK_STACK_SIZE - 16) as u64;
        idle.ctx.x30 = idle_loop as usize as u64;

        self.current = Some(0);
        self.ready_head = None;
        self.next_tid = 1;
        self.tick_count = 0;
    }

    fn create(&mut self, entry: extern "C" fn() -> !, priority: u32) -> u32 {
        let Some(slot) = (0..MAX_TASKS).find(|&i| self.tasks[i].state == TaskState::Dead) else {
            return 0;
        };

        let stack = crate::frame::alloc_page();
        if stack == 0 {
            return 0;
        }

        let tid = self.next_tid;
        self.next_tid += 1;

        let t = &mut self.tasks[slot];
        t.tid = tid;
        t.state = TaskState::Ready;
        t.priority = priority;
        t.time_slice = priority + 1;
        t.stack_base = stack;
        t.sleep_until = 0;
        t.ctx = Context::zero();
        t.ctx.sp = (stack + TASK_STACK_SIZE - 16) as u64;
        t.ctx.x30 = entry as usize as u64;

        self.enqueue(slot as u8);
        tid
    }

    /// Marks the current task dead and frees its stack. Does not itself
    /// invoke `schedule_locked` — callers run that afterward, outside any
    /// borrow of `self`, per the do_schedule/task_* wrapper pattern below.
    fn exit_current(&mut self) {
        let Some(cur) = self.current else { return };
        if cur == 0 {
            return; // idle cannot exit
        }
        let stack = self.tasks[cur as usize].stack_base;
        self.tasks[cur as usize].state = TaskState::Dead;
        self.current = None;
        crate::frame::free_page(stack);
    }

    fn wake_sleepers(&mut self) {
        for i in 0..MAX_TASKS {
            if self.tasks[i].state == TaskState::Sleeping && self.tasks[i].sleep_until <= self.tick_count {
                self.tasks[i].state = TaskState::Ready;
                self.enqueue(i as u8);
            }
        }
    }

    /// Walk the ready ring once, picking strictly-greatest priority with
    /// insertion-order tie-break (first seen wins). Returns `None` if the
    /// ring is empty (idle should run).
    fn pick_ready(&self) -> Option<u8> {
        let head = self.ready_head?;
        let mut best = head;
        let mut cur = head;
        loop {
            if self.tasks[cur as usize].priority > self.tasks[best as usize].priority {
                best = cur;
            }
            cur = self.tasks[cur as usize].next.unwrap();
            if cur == head {
                break;
            }
        }
        Some(best)
    }

    /// Returns `(old_ctx_ptr, new_ctx_ptr)` if a switch is needed.
    fn schedule_locked(&mut self) -> Option<(*mut Context, *mut Context)> {
        self.tick_count = crate::timer::get_ticks();
        self.wake_sleepers();

        let chosen = self.pick_ready().unwrap_or(0);
        let current = self.current.unwrap_or(0);

        if chosen == current {
            return None;
        }

        if chosen != 0 {
            self.unlink(chosen);
            self.tasks[chosen as usize].state = TaskState::Running;
        }

        let old_ptr = &mut self.tasks[current as usize].ctx as *mut Context;
        let new_ptr = &mut self.tasks[chosen as usize].ctx as *mut Context;
        self.current = Some(chosen);
        Some((old_ptr, new_ptr))
    }

    fn timer_tick(&mut self) {
        self.tick_count += 1;
        if let Some(cur) = self.current {
            if cur != 0 {
                self.tasks[cur as usize].time_slice -= 1;
                if self.tasks[cur as usize].time_slice == 0 {
                    self.tasks[cur as usize].time_slice = self.tasks[cur as usize].priority + 1;
                    self.tasks[cur as usize].state = TaskState::Ready;
                    self.enqueue(cur);
                }
            }
        }
    }

    fn current_tid(&self) -> u32 {
        self.current.map(|c| self.tasks[c as usize].tid).unwrap_or(0)
    }
}

static SCHED: Spinlock<Scheduler> = Spinlock::new(Scheduler::new());

pub fn sched_init() {
    SCHED.lock().init();
}

pub fn task_create(entry: extern "C" fn() -> !, priority: u32) -> u32 {
    let _g = IrqGuard::new();
    SCHED.lock().create(entry, priority)
}

pub fn task_exit() {
    do_schedule(|s| s.exit_current());
}

pub fn task_yield() {
    let _g = IrqGuard::new();
    let switch = {
        let mut s = SCHED.lock();
        if let Some(cur) = s.current {
            if s.tasks[cur as usize].state == TaskState::Running {
                s.tasks[cur as usize].state = TaskState::Ready;
                s.enqueue(cur);
            }
        }
        s.schedule_locked()
    };
    if let Some((old, new)) = switch {
        context_switch(old, new);
    }
}

pub fn task_sleep(ms: u64) {
    let _g = IrqGuard::new();
    let switch = {
        let mut s = SCHED.lock();
        let Some(cur) = s.current else { return };
        if cur != 0 {
            s.tasks[cur as usize].state = TaskState::Sleeping;
            s.tasks[cur as usize].sleep_until = s.tick_count + ms;
        }
        s.schedule_locked()
    };
    if let Some((old, new)) = switch {
        context_switch(old, new);
    }
}

pub fn schedule() {
    let switch = { SCHED.lock().schedule_locked() };
    if let Some((old, new)) = switch {
        context_switch(old, new);
    }
}

/// Internal helper shared by `task_exit`: mutate scheduler state under the
/// lock and IRQ guard, then switch outside both.
fn do_schedule(f: impl FnOnce(&mut Scheduler)) {
    let _g = IrqGuard::new();
    let switch = {
        let mut s = SCHED.lock();
        f(&mut s);
        s.schedule_locked()
    };
    if let Some((old, new)) = switch {
        context_switch(old, new);
    }
}

pub fn timer_tick() {
    let switch = {
        let mut s = SCHED.lock();
        s.timer_tick();
        if s.tasks[s.current.unwrap_or(0) as usize].state != TaskState::Running {
            s.schedule_locked()
        } else {
            None
        }
    };
    if let Some((old, new)) = switch {
        context_switch(old, new);
    }
}

pub fn get_current_tid() -> u32 {
    SCHED.lock().current_tid()
}

#[cfg(target_arch = "aarch64")]
core::arch::global_asm!(
    r#"
.global switch_context
switch_context:
    stp x19, x20, [x0, #0]
    stp x21, x22, [x0, #16]
    stp x23, x24, [x0, #32]
    stp x25, x26, [x0, #48]
    stp x27, x28, [x0, #64]
    stp x29, x30, [x0, #80]
    mov x9, sp
    str x9, [x0, #96]

    ldp x19, x20, [x1, #0]
    ldp x21, x22, [x1, #16]
    ldp x23, x24, [x1, #32]
    ldp x25, x26, [x1, #48]
    ldp x27, x28, [x1, #64]
    ldp x29, x30, [x1, #80]
    ldr x9, [x1, #96]
    mov sp, x9
    ret
"#
);

#[cfg(target_arch = "aarch64")]
unsafe extern "C" {
    fn switch_context(old: *mut Context, new: *mut Context);
}

#[cfg(target_arch = "aarch64")]
fn context_switch(old: *mut Context, new: *mut Context) {
    unsafe { switch_context(old, new) };
}

#[cfg(not(target_arch = "aarch64"))]
fn context_switch(_old: *mut Context, _new: *mut Context) {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    fn fresh() -> Box<Scheduler> {
        let mut s = Box::new(Scheduler::new());
        // avoid touching the frame allocator singleton from unit tests:
        // seed idle by hand instead of calling init().
        s.tasks[0].state = TaskState::Running;
        s.current = Some(0);
        s
    }

    #[test]
    fn ring_enqueue_dequeue_is_fifo_within_priority() {
        let mut s = fresh();
        s.tasks[1].state = TaskState::Ready;
        s.tasks[1].priority = 3;
        s.tasks[2].state = TaskState::Ready;
        s.tasks[2].priority = 3;
        s.enqueue(1);
        s.enqueue(2);
        assert_eq!(s.pick_ready(), Some(1));
    }

    #[test]
    fn strictly_greatest_priority_wins() {
        let mut s = fresh();
        s.tasks[1].state = TaskState::Ready;
        s.tasks[1].priority = 1;
        s.tasks[2].state = TaskState::Ready;
        s.tasks[2].priority = 5;
        s.enqueue(1);
        s.enqueue(2);
        assert_eq!(s.pick_ready(), Some(2));
    }

    #[test]
    fn unlink_sole_entry_empties_ring() {
        let mut s = fresh();
        s.tasks[1].state = TaskState::Ready;
        s.enqueue(1);
        s.unlink(1);
        assert!(s.ready_head.is_none());
    }

    #[test]
    fn empty_ring_selects_idle() {
        let s = fresh();
        assert!(s.pick_ready().is_none());
    }
}
