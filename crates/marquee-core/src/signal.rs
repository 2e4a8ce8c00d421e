//! One-shot completion signals
//!
//! Slow work (script loading, manifest activation) is modelled as a signal
//! the caller may await. A [`Completer`] settles it once; any number of
//! [`Completion`] clones observe the outcome.

use crate::event::BackendFamily;
use crate::{Error, Result};
use tokio::sync::watch;

/// Why a signal was rejected
#[derive(Debug, Clone)]
enum Failure {
    Initialization(String),
    Engine { family: BackendFamily, message: String },
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Initialization(reason) => Error::Initialization(reason),
            Failure::Engine { family, message } => Error::engine(family, message),
        }
    }
}

type Outcome = Option<std::result::Result<(), Failure>>;

/// Settling side of a completion signal
#[derive(Debug)]
pub struct Completer {
    tx: watch::Sender<Outcome>,
}

/// Awaitable side of a completion signal
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Outcome>,
}

/// Create a pending completion signal
pub fn completion() -> (Completer, Completion) {
    let (tx, rx) = watch::channel(None);
    (Completer { tx }, Completion { rx })
}

impl Completer {
    /// Resolve the signal. Only the first settle call has an effect.
    pub fn complete(&self) {
        self.settle(Ok(()));
    }

    /// Reject the signal. Only the first settle call has an effect.
    pub fn fail(&self, reason: impl Into<String>) {
        self.settle(Err(Failure::Initialization(reason.into())));
    }

    /// Reject the signal with a backend runtime error
    pub fn fail_engine(&self, family: BackendFamily, message: impl Into<String>) {
        self.settle(Err(Failure::Engine {
            family,
            message: message.into(),
        }));
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    fn settle(&self, outcome: std::result::Result<(), Failure>) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        });
    }
}

impl Completion {
    /// A signal that is already resolved
    pub fn resolved() -> Self {
        let (completer, completion) = completion();
        completer.complete();
        completion
    }

    /// A signal that is already rejected
    pub fn rejected(reason: impl Into<String>) -> Self {
        let (completer, completion) = completion();
        completer.fail(reason);
        completion
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the signal to settle
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.rx.clone();
        let outcome = {
            let settled = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| Error::SignalDropped)?;
            Outcome::clone(&settled)
        };

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(failure)) => Err(failure.into()),
            None => Err(Error::SignalDropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_all_waiters() {
        let (completer, completion) = completion();
        let other = completion.clone();
        assert!(!completion.is_settled());

        completer.complete();
        completer.fail("too late");

        assert!(completion.wait().await.is_ok());
        assert!(other.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejection_and_drop() {
        let err = Completion::rejected("ima3.js blocked").wait().await.unwrap_err();
        assert!(matches!(err, Error::Initialization(ref r) if r == "ima3.js blocked"));

        let (completer, completion) = completion();
        drop(completer);
        assert!(matches!(completion.wait().await, Err(Error::SignalDropped)));
    }

    #[tokio::test]
    async fn test_engine_failure() {
        let (completer, completion) = completion();
        completer.fail_engine(BackendFamily::Dash, "manifest 404");
        completer.complete();

        let err = completion.wait().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "DASH engine error: manifest 404");
    }

    #[test]
    fn test_settled_value_survives_sender_drop() {
        let completion = Completion::resolved();
        assert!(completion.is_settled());
        assert!(tokio_test::block_on(completion.wait()).is_ok());
    }
}
