//! Bounded, cancellable waits on telemetry feeds.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use flotilla_link::Feed;

use crate::error::AgentError;
use crate::types::Operation;

/// How long one wait may take and what aborts it.
pub(crate) struct WaitScope<'a> {
    pub agent_id: u32,
    pub operation: Operation,
    pub timeout: Option<Duration>,
    pub cancel: &'a CancellationToken,
}

impl WaitScope<'_> {
    /// Consumes `feed` until an item satisfies `pred` and returns that item.
    pub async fn until<T, F>(&self, mut feed: Feed<T>, name: &'static str, mut pred: F) -> Result<T, AgentError>
    where
        F: FnMut(&T) -> bool,
    {
        let search = async {
            while let Some(item) = feed.next().await {
                if pred(&item) {
                    return Ok(item);
                }
            }
            Err(AgentError::FeedClosed {
                agent_id: self.agent_id,
                operation: self.operation,
                feed: name,
            })
        };
        self.bounded(search).await
    }

    /// The next item of `feed`, whatever it is.
    pub async fn next<T>(&self, feed: Feed<T>, name: &'static str) -> Result<T, AgentError> {
        self.until(feed, name, |_| true).await
    }

    /// Sleeps for `duration`. Not subject to the wait timeout, only to
    /// cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<(), AgentError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, AgentError>>,
    ) -> Result<T, AgentError> {
        let limited = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| AgentError::TimedOut {
                        agent_id: self.agent_id,
                        operation: self.operation,
                    })?,
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            res = limited => res,
        }
    }

    fn cancelled(&self) -> AgentError {
        AgentError::Cancelled {
            agent_id: self.agent_id,
            operation: self.operation,
        }
    }
}
