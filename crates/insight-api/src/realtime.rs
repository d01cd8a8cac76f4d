//! Server-sent events subscription for realtime chat events

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::{
    client::ApiClient,
    error::{Error, Result},
    events::{ChatEvent, ChatEventStream},
};

/// Default path of the realtime event endpoint, relative to the base URL
pub const DEFAULT_EVENTS_PATH: &str = "events";

impl ApiClient {
    /// Open the realtime channel and decode chat events from it.
    ///
    /// Events that are not chat events (other features share the channel) are
    /// skipped. A transport error is yielded once and ends the stream; the
    /// caller decides whether to subscribe again.
    pub fn subscribe(&self, path: &str) -> Result<ChatEventStream> {
        let request = self
            .authorize(self.client.get(self.url(path)))
            .header("accept", "text/event-stream");

        let event_source = EventSource::new(request)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn create_stream(
    mut event_source: EventSource,
) -> impl futures::Stream<Item = Result<ChatEvent>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {
                    tracing::debug!("Realtime channel open");
                }
                Ok(Event::Message(msg)) => match ChatEvent::decode(&msg.event, &msg.data) {
                    Ok(chat_event) => yield Ok(chat_event),
                    Err(Error::UnknownEvent(name)) => {
                        tracing::trace!("Skipping non-chat event {}", name);
                    }
                    Err(e) => {
                        tracing::warn!("Dropping undecodable {} event: {}", msg.event, e);
                    }
                },
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    tracing::debug!("Realtime channel ended");
                    break;
                }
                Err(e) => {
                    event_source.close();
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
    }
}
