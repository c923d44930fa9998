mod coordinator;
mod state;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::NegotiationError;

pub use coordinator::Coordinator;
pub use state::NegotiationState;

/// Resolves when the coordinator finishes the requested operation. Dropping
/// it does not cancel anything.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, NegotiationError>>,
}

impl<T> Completion<T> {
    pub(crate) fn channel() -> (oneshot::Sender<Result<T, NegotiationError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, NegotiationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(NegotiationError::CoordinatorStopped)))
    }
}
