//! Wake-up channel
//!
//! Background UDP listener that lets the queue shorten the wait between "no
//! job available" and the next poll. The exchange is a single datagram:
//! request `wakeup` is answered with `ok` and raises the shared signal, any
//! other payload is answered with `no`.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time;
use tracing::{debug, info, warn};

/// Single-slot wake event shared between the listener and the orchestrator.
///
/// Multiple sets while unconsumed collapse to one wake. `wait` re-checks the
/// flag at most every `tick`, so a blocked orchestrator stays responsive to
/// process-level cancellation.
#[derive(Debug, Default)]
pub struct WakeSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Blocks until the signal is set, resolving within one `tick` of it.
    pub async fn wait(&self, tick: Duration) {
        while !self.is_set() {
            let _ = time::timeout(tick, self.notify.notified()).await;
        }
    }
}

/// Decides whether a wake-up datagram is genuine.
///
/// The stock implementation compares against a literal token; a deployment
/// wanting a shared secret or signed token plugs its verifier in here without
/// touching the orchestrator.
pub trait WakeupVerifier: Send + Sync {
    fn verify(&self, payload: &[u8]) -> bool;
}

/// Accepts datagrams that exactly match a configured token.
pub struct LiteralToken(Vec<u8>);

impl LiteralToken {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self(token.into())
    }
}

impl WakeupVerifier for LiteralToken {
    fn verify(&self, payload: &[u8]) -> bool {
        payload == self.0.as_slice()
    }
}

/// UDP listener for out-of-band wake-up notifications.
pub struct WakeupListener {
    socket: UdpSocket,
    signal: Arc<WakeSignal>,
    verifier: Box<dyn WakeupVerifier>,
}

impl WakeupListener {
    /// Binds the wake-up endpoint. A bind failure is fatal at startup.
    pub async fn bind(
        addr: &str,
        signal: Arc<WakeSignal>,
        verifier: Box<dyn WakeupVerifier>,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("failed to bind wake-up socket on {addr}"))?;
        info!(
            "listening for wake-up signals on udp://{}",
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            signal,
            verifier,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop; runs until the owning task is dropped. Socket errors are
    /// logged, never fatal.
    pub async fn run(self) {
        let mut buf = [0u8; 1024];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("wake-up receive failed: {e}");
                    continue;
                }
            };
            let payload = &buf[..len];
            debug!(%peer, payload = %String::from_utf8_lossy(payload), "wake-up datagram");

            if self.verifier.verify(payload) {
                info!("received valid wake-up signal");
                if let Err(e) = self.socket.send_to(b"ok", peer).await {
                    warn!("wake-up reply failed: {e}");
                }
                self.signal.set();
            } else {
                info!("received invalid wake-up signal");
                if let Err(e) = self.socket.send_to(b"no", peer).await {
                    warn!("wake-up reply failed: {e}");
                }
            }
        }
    }
}
