//! Terminal signals received by the shell, recorded as flags for the interactive loop.
//!
//! SIGINT goes through `ctrlc`; SIGTSTP has no `ctrlc` equivalent and is caught with a
//! plain `sigaction` handler. Neither stops the shell itself.

use anyhow::{Context, Result};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static SUSPEND_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigtstp(_signal: libc::c_int) {
    SUSPEND_REQUESTED.store(true, Ordering::Relaxed);
}

pub struct SignalRouter {
    interrupt: Arc<AtomicBool>,
}

impl SignalRouter {
    /// Install the handlers. Once per process.
    pub fn install() -> Result<Self> {
        let interrupt = Arc::new(AtomicBool::new(false));
        let interrupt_handler = Arc::clone(&interrupt);
        ctrlc::set_handler(move || {
            interrupt_handler.store(true, Ordering::Relaxed);
        })
        .context("set Ctrl+C handler")?;
        install_sigtstp().context("set Ctrl+Z handler")?;
        Ok(SignalRouter { interrupt })
    }

    /// True once per Ctrl+C.
    pub fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::Relaxed)
    }

    /// True once per Ctrl+Z.
    pub fn take_suspend(&self) -> bool {
        SUSPEND_REQUESTED.swap(false, Ordering::Relaxed)
    }
}

fn install_sigtstp() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_sigtstp as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGTSTP, &action, std::ptr::null_mut()) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
