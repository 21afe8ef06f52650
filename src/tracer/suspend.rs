//! Per-thread suspension of execution hooks
//!
//! Work done on behalf of the tracer (encoding values, writing to a socket)
//! runs on the traced thread. While a [`HookSuspension`] guard is alive the
//! tracer ignores every notification from that thread, and the previous state
//! comes back when the guard drops.

use std::cell::Cell;

thread_local! {
    static SUSPENDED: Cell<bool> = const { Cell::new(false) };
}

#[must_use = "hooks resume as soon as the guard is dropped"]
pub struct HookSuspension {
    previous: bool,
}

pub fn suspend_hooks() -> HookSuspension {
    let previous = SUSPENDED.with(|flag| flag.replace(true));
    HookSuspension { previous }
}

pub fn hooks_suspended() -> bool {
    SUSPENDED.with(Cell::get)
}

impl Drop for HookSuspension {
    fn drop(&mut self) {
        SUSPENDED.with(|flag| flag.set(self.previous));
    }
}
