//! Signal relay for the supervised child (SIGINT/SIGTERM/SIGHUP)
//!
//! While a [`SignalRelay`] is alive, each relayed signal delivered to this
//! process is forwarded unchanged to the attached child pid. The handler only calls
//! `kill(2)` and sets a bit in an atomic mask; the supervisor's wait loop
//! drains the mask to log what was relayed.
//!
//! A signal that arrives while no child is attached is parked in a pending
//! mask instead. Whoever clears a pending bit forwards that signal, so each
//! one reaches the child exactly once.
//!
//! Dropping the relay restores the previous dispositions.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use tracing::debug;

/// Signals forwarded to the child
pub const RELAYED_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

/// Pid of the child receiving relayed signals (0 when none)
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

/// Bit `n` set when signal `n` was relayed and not yet drained
static RELAYED: AtomicU32 = AtomicU32::new(0);

/// Bit `n` set when signal `n` arrived with no child to forward it to
static PENDING: AtomicU32 = AtomicU32::new(0);

/// Serializes tests that install a relay
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

extern "C" fn relay(signum: libc::c_int) {
    let pid = CHILD_PID.load(Ordering::SeqCst);
    if pid > 0 {
        // SAFETY: kill(2) is async-signal-safe
        unsafe {
            libc::kill(pid, signum);
        }
        RELAYED.fetch_or(signal_bit(signum), Ordering::SeqCst);
    } else {
        PENDING.fetch_or(signal_bit(signum), Ordering::SeqCst);
    }
}

fn signal_bit(signum: libc::c_int) -> u32 {
    if (1..32).contains(&signum) {
        1 << signum
    } else {
        0
    }
}

/// Decode a relayed-signal mask into signals, lowest number first
fn decode(mask: u32) -> Vec<Signal> {
    (1..32)
        .filter(|&n| mask & (1 << n) != 0)
        .filter_map(|n| Signal::try_from(n as libc::c_int).ok())
        .collect()
}

/// Installed relay; restores previous handlers on drop
pub struct SignalRelay {
    child: Option<Pid>,
    previous: Vec<(Signal, SigAction)>,
}

impl SignalRelay {
    /// Take over [`RELAYED_SIGNALS`].
    ///
    /// Signals received before [`attach`](Self::attach) are recorded and
    /// forwarded once a child is attached. Only one relay should be installed
    /// at a time; the target pid is process-global.
    pub fn install() -> nix::Result<Self> {
        CHILD_PID.store(0, Ordering::SeqCst);
        RELAYED.store(0, Ordering::SeqCst);
        PENDING.store(0, Ordering::SeqCst);

        let action = SigAction::new(SigHandler::Handler(relay), SaFlags::SA_RESTART, SigSet::empty());
        let mut installed = Self {
            child: None,
            previous: Vec::with_capacity(RELAYED_SIGNALS.len()),
        };

        for signal in RELAYED_SIGNALS {
            // SAFETY: the handler only touches atomics and calls kill(2)
            let previous = unsafe { sigaction(signal, &action) }?;
            installed.previous.push((signal, previous));
        }

        debug!("signal relay installed");
        Ok(installed)
    }

    /// Forward to `child` from now on, including anything already received
    pub fn attach(&mut self, child: Pid) {
        self.child = Some(child);
        CHILD_PID.store(child.as_raw(), Ordering::SeqCst);
        self.forward_pending();
        debug!(pid = child.as_raw(), "signal relay attached");
    }

    /// Forward signals parked while no child was attached.
    ///
    /// The handler may read an unset pid just before [`attach`](Self::attach)
    /// publishes it and park its signal afterwards; the wait loop picks those
    /// up through [`take_relayed`](Self::take_relayed).
    fn forward_pending(&self) {
        let Some(child) = self.child else {
            return;
        };
        let pending = PENDING.swap(0, Ordering::SeqCst);
        for signal in decode(pending) {
            let _ = nix::sys::signal::kill(child, signal);
        }
        RELAYED.fetch_or(pending, Ordering::SeqCst);
    }

    pub fn child(&self) -> Option<Pid> {
        self.child
    }

    /// Signals relayed since the last call
    pub fn take_relayed(&self) -> Vec<Signal> {
        self.forward_pending();
        decode(RELAYED.swap(0, Ordering::SeqCst))
    }
}

impl std::fmt::Debug for SignalRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRelay")
            .field("child", &self.child)
            .field("signals", &self.previous.iter().map(|(s, _)| *s).collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        for (signal, previous) in self.previous.drain(..).rev() {
            // SAFETY: restoring a disposition obtained from sigaction
            let _ = unsafe { sigaction(signal, &previous) };
        }
        CHILD_PID.store(0, Ordering::SeqCst);
        PENDING.store(0, Ordering::SeqCst);
        debug!("signal relay removed");
    }
}
