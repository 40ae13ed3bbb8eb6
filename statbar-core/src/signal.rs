// statbar-core/src/signal.rs
use signal_hook::SigId;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1};
use signal_hook::{flag, low_level};
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const SHUTDOWN_SIGNALS: [i32; 2] = [SIGTERM, SIGINT];
const RELOAD_SIGNALS: [i32; 2] = [SIGHUP, SIGUSR1];

/// Cloneable setter side of the shutdown and reload latches
#[derive(Debug, Clone, Default)]
pub struct SignalHandle {
    shutdown: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl SignalHandle {
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }
}

/// Latches set from signal handlers (or any other thread) and read by the
/// scheduler once per iteration.
///
/// When installed, every handled signal also writes a byte to a self-pipe
/// whose read end the scheduler waits on, so a signal that lands just before
/// the blocking wait still wakes it.
#[derive(Debug, Default)]
pub struct SignalBridge {
    handle: SignalHandle,
    wake_rx: Option<UnixStream>,
    registered: Vec<SigId>,
}

impl SignalBridge {
    /// Latches only, no OS signal handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGTERM/SIGINT to shutdown and SIGHUP/SIGUSR1 to reload
    pub fn install() -> io::Result<Self> {
        let mut bridge = Self::new();
        let (wake_rx, wake_tx) = UnixStream::pair()?;
        wake_rx.set_nonblocking(true)?;
        wake_tx.set_nonblocking(true)?;

        // Flags first: actions run in registration order, so a latch is
        // always set before the matching wakeup byte is written.
        for signal in SHUTDOWN_SIGNALS {
            let id = flag::register(signal, Arc::clone(&bridge.handle.shutdown))?;
            bridge.registered.push(id);
        }
        for signal in RELOAD_SIGNALS {
            let id = flag::register(signal, Arc::clone(&bridge.handle.reload))?;
            bridge.registered.push(id);
        }
        for signal in SHUTDOWN_SIGNALS.into_iter().chain(RELOAD_SIGNALS) {
            let id = low_level::pipe::register(signal, wake_tx.try_clone()?)?;
            bridge.registered.push(id);
        }

        bridge.wake_rx = Some(wake_rx);
        Ok(bridge)
    }

    pub fn handle(&self) -> SignalHandle {
        self.handle.clone()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.handle.shutdown.load(Ordering::SeqCst)
    }

    /// Read and clear the reload latch
    pub fn take_reload(&self) -> bool {
        self.handle.reload.swap(false, Ordering::SeqCst)
    }

    pub fn wake_fd(&self) -> Option<BorrowedFd<'_>> {
        self.wake_rx.as_ref().map(|rx| rx.as_fd())
    }

    /// Empty the self-pipe after it was reported readable
    pub fn drain_wakeups(&self) {
        let Some(mut rx) = self.wake_rx.as_ref() else {
            return;
        };
        let mut buf = [0u8; 64];
        loop {
            match rx.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        for id in self.registered.drain(..) {
            low_level::unregister(id);
        }
    }
}
