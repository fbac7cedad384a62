//! Where translated responses go.

use async_trait::async_trait;

use crate::error::Result;
use crate::translate::chat_types::ChatResponse;

/// Receives native responses in the order they were produced.
///
/// The transcoders await each delivery before reading further, so a slow
/// sink applies backpressure to the remote. Returning `Err` ends the call
/// and the error is handed back to whoever called [`crate::remote::RemoteClient::send`].
#[async_trait]
pub trait ResponseSink: Send {
    async fn deliver(&mut self, response: ChatResponse) -> Result<()>;
}

/// Collects every response, mostly for non-streaming callers and tests.
#[async_trait]
impl ResponseSink for Vec<ChatResponse> {
    async fn deliver(&mut self, response: ChatResponse) -> Result<()> {
        self.push(response);
        Ok(())
    }
}
