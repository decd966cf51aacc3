use tokio::sync::watch;

/// Create a cancellation pair for one parse operation.
#[must_use]
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Host-side handle: flipping it stops every parser task observing the
/// matching [`CancelSignal`].
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers may already be gone if the parse finished first.
        let _ = self.tx.send(true);
    }
}

/// Parser-side view of the cancellation state; cheap to clone into tasks.
#[derive(Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires, for parses run without a host handle.
    #[must_use]
    pub const fn never() -> Self {
        Self { rx: None }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Suspend until cancellation fires. Never resolves for
    /// [`CancelSignal::never`] or once the handle is dropped uncancelled.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling; this parse will run to
                // completion.
                return std::future::pending().await;
            }
        }
    }
}
