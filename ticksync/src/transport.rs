//! Packet transport seam.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::error::TransportError;

/// An unreliable, message-oriented link to one remote endpoint.
///
/// Implementations are polled from the tick thread: `receive` must not
/// block and returns `None` once no message is ready.
pub trait Transport: Send {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    fn receive(&mut self) -> Option<Vec<u8>>;

    fn is_connected(&self) -> bool;
}

/// In-memory transport over a pair of crossbeam channels.
///
/// Optionally drops outbound messages at random to simulate a lossy link.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    loss: f32,
    rng: fastrand::Rng,
    connected: bool,
}

impl ChannelTransport {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            tx,
            rx,
            loss: 0.0,
            rng: fastrand::Rng::new(),
            connected: true,
        }
    }

    /// Drops each outbound message with probability `loss`, using a seeded
    /// generator so runs are reproducible.
    #[must_use]
    pub fn with_loss(mut self, loss: f32, seed: u64) -> Self {
        self.loss = loss.clamp(0.0, 1.0);
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    /// Number of messages waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        if self.loss > 0.0 && self.rng.f32() < self.loss {
            return Ok(());
        }
        self.tx.send(payload.to_vec()).map_err(|_| {
            self.connected = false;
            TransportError::Disconnected
        })
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        match self.rx.try_recv() {
            Ok(payload) => Some(payload),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.connected = false;
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_delivers_both_ways() {
        let (mut a, mut b) = ChannelTransport::pair();
        a.send(&[1, 2]).unwrap();
        b.send(&[3]).unwrap();
        assert_eq!(b.receive(), Some(vec![1, 2]));
        assert_eq!(a.receive(), Some(vec![3]));
        assert_eq!(a.receive(), None);
    }

    #[test]
    fn drop_disconnects_other_end() {
        let (mut a, b) = ChannelTransport::pair();
        drop(b);
        assert!(a.is_connected());
        assert_eq!(a.receive(), None);
        assert!(!a.is_connected());
        assert_eq!(a.send(&[1]), Err(TransportError::Disconnected));
    }

    #[test]
    fn messages_survive_until_drained() {
        let (mut a, b) = ChannelTransport::pair();
        let mut b = b;
        b.send(&[9]).unwrap();
        drop(b);
        assert_eq!(a.receive(), Some(vec![9]));
        assert_eq!(a.receive(), None);
        assert!(!a.is_connected());
    }

    #[test]
    fn full_loss_drops_everything() {
        let (a, mut b) = ChannelTransport::pair();
        let mut a = a.with_loss(1.0, 7);
        for _ in 0..10 {
            a.send(&[1]).unwrap();
        }
        assert_eq!(b.receive(), None);
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn seeded_loss_is_reproducible() {
        let run = || {
            let (a, b) = ChannelTransport::pair();
            let mut a = a.with_loss(0.5, 42);
            for i in 0..64u8 {
                a.send(&[i]).unwrap();
            }
            b.pending()
        };
        let delivered = run();
        assert_eq!(delivered, run());
        assert!(delivered > 0 && delivered < 64);
    }
}
