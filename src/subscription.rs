use crate::error::{BulbError, Result};
use crate::types::{Change, UpdateSource};
use tokio::sync::broadcast;

/// A change to a bulb's canonical state
///
/// Commands produce `Optimistic` events immediately; the bulb's reply or
/// property push later produces `Confirmed` events for the same attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct BulbEvent {
    pub change: Change,
    pub source: UpdateSource,
}

/// Receiver for bulb events
pub struct StateReceiver {
    rx: broadcast::Receiver<BulbEvent>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<BulbEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Returns `ConnectionClosed` once the bulb session has been dropped.
    pub async fn recv(&mut self) -> Result<BulbEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => BulbError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                BulbError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive an event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<BulbEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BulbError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(BulbError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
