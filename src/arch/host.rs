//! Host port. There is no second stack to switch to on a development
//! machine, so a context switch request is only recorded; tests play the
//! part of PendSV by calling `kernel::switch_context` themselves.

use crate::port::Port;

#[derive(Debug, Default)]
pub struct HostCpu {
    switch_requests: u32,
}

impl HostCpu {
    pub const fn new() -> Self {
        Self { switch_requests: 0 }
    }

    pub fn switch_requests(&self) -> u32 {
        self.switch_requests
    }
}

impl Port for HostCpu {
    fn now_ticks(&self) -> u32 {
        super::now_ticks()
    }

    fn request_context_switch(&mut self) {
        self.switch_requests = self.switch_requests.wrapping_add(1);
    }

    fn task_exit_address(&self) -> u32 {
        task_exit as usize as u32
    }

    fn idle_entry_address(&self) -> u32 {
        idle as usize as u32
    }
}

extern "C" fn task_exit() {
    crate::kernel::exit_current();
}

extern "C" fn idle() {}
