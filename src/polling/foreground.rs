use tokio::sync::broadcast;

const SIGNAL_CAPACITY: usize = 16;

/// Fan-out for "the user came back to this view" events.
#[derive(Debug, Clone)]
pub struct ForegroundSignal {
    tx: broadcast::Sender<()>,
}

impl ForegroundSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    /// Returns the number of listeners that were notified.
    pub fn emit(&self) -> usize {
        self.tx.send(()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for ForegroundSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listeners() {
        let signal = ForegroundSignal::new();
        assert_eq!(signal.emit(), 0);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let signal = ForegroundSignal::new();
        let mut rx = signal.subscribe();

        assert_eq!(signal.emit(), 1);
        assert!(rx.recv().await.is_ok());
    }
}
