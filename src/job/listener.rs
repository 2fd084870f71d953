//! Completion listener: one thread multiplexing the completion pipes of all live jobs.
//!
//! Pipes are registered over a channel together with a callback. The thread polls every
//! registered pipe with a timeout, accumulates what arrives, and on end-of-file hands the
//! payload to the callback.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::utils::config::ListenerConsts;

pub type CompletionCallback = Box<dyn FnOnce(Vec<u8>) + Send>;

struct Registration {
    pipe: File,
    callback: CompletionCallback,
}

struct Watched {
    pipe: File,
    payload: Vec<u8>,
    callback: CompletionCallback,
}

pub struct Listener {
    register_tx: Sender<Registration>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    pub fn start(poll_timeout: Duration) -> Self {
        let (register_tx, register_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_t = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("job-listener".to_string())
            .spawn(move || listen(register_rx, stop_t, poll_timeout))
            .map_err(|e| warn!("cannot start job listener: {}", e))
            .ok();
        Listener {
            register_tx,
            stop,
            handle,
        }
    }

    /// Watch `pipe`; `callback` runs on the listener thread when the writer closes it.
    pub fn register(
        &self,
        pipe: File,
        callback: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> anyhow::Result<()> {
        self.register_tx
            .send(Registration {
                pipe,
                callback: Box::new(callback),
            })
            .map_err(|_| anyhow::anyhow!("job listener is not running"))
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn listen(register_rx: Receiver<Registration>, stop: Arc<AtomicBool>, poll_timeout: Duration) {
    let mut watched: Vec<Watched> = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        if watched.is_empty() {
            // Nothing to poll: block on registrations instead.
            match register_rx.recv_timeout(poll_timeout) {
                Ok(r) => watched.push(Watched::from(r)),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        watched.extend(register_rx.try_iter().map(Watched::from));
        let ready = match poll_ready(&watched, poll_timeout) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("job listener poll failed: {}", e);
                continue;
            }
        };
        let mut finished = Vec::new();
        for i in ready {
            if watched[i].read_chunk() {
                finished.push(i);
            }
        }
        for i in finished.into_iter().rev() {
            let w = watched.swap_remove(i);
            debug!("completion pipe closed ({} byte payload)", w.payload.len());
            (w.callback)(w.payload);
        }
    }
}

impl From<Registration> for Watched {
    fn from(r: Registration) -> Self {
        Watched {
            pipe: r.pipe,
            payload: Vec::new(),
            callback: r.callback,
        }
    }
}

impl Watched {
    /// Read what is available. True at end-of-file (or a read error, treated the same).
    fn read_chunk(&mut self) -> bool {
        let mut buf = [0u8; ListenerConsts::READ_CHUNK];
        match self.pipe.read(&mut buf) {
            Ok(0) => true,
            Ok(n) => {
                self.payload.extend_from_slice(&buf[..n]);
                false
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
            Err(e) => {
                warn!("completion pipe read failed: {}", e);
                true
            }
        }
    }
}

/// Indices of pipes with data or hang-up.
fn poll_ready(watched: &[Watched], timeout: Duration) -> io::Result<Vec<usize>> {
    let mut fds: Vec<libc::pollfd> = watched
        .iter()
        .map(|w| libc::pollfd {
            fd: w.pipe.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc == -1 {
        let e = io::Error::last_os_error();
        if e.kind() == io::ErrorKind::Interrupted {
            return Ok(Vec::new());
        }
        return Err(e);
    }
    Ok(fds
        .iter()
        .enumerate()
        .filter(|(_, p)| p.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
        .map(|(i, _)| i)
        .collect())
}
