//! NATS request loop
//!
//! One spawned task per inbound message, bounded by a semaphore. On shutdown
//! the loop stops pulling messages, waits for in-flight handlers to publish
//! their replies and flushes the connection.

use async_nats::{Client, Message, Subscriber};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};
use vigil_core::{Result, VigilError};

use crate::dispatcher::Dispatcher;

/// Subscribe to the request subject, joining `queue_group` when given
pub async fn subscribe(client: &Client, subject: &str, queue_group: Option<&str>) -> Result<Subscriber> {
    let subscriber = match queue_group {
        Some(group) => {
            client
                .queue_subscribe(subject.to_string(), group.to_string())
                .await
        }
        None => client.subscribe(subject.to_string()).await,
    }
    .map_err(|e| VigilError::Network(format!("Failed to subscribe to {}: {}", subject, e)))?;

    info!(subject, queue_group, "Subscribed to request subject");
    Ok(subscriber)
}

/// Where replies go
#[async_trait]
pub trait ReplySink: Send + Sync + 'static {
    async fn send_reply(&self, subject: String, payload: Vec<u8>) -> Result<()>;
    async fn flush_replies(&self) -> Result<()>;
}

#[async_trait]
impl ReplySink for Client {
    async fn send_reply(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        Client::publish(self, subject, payload.into())
            .await
            .map_err(|e| VigilError::Network(e.to_string()))
    }

    async fn flush_replies(&self) -> Result<()> {
        Client::flush(self)
            .await
            .map_err(|e| VigilError::Network(format!("Failed to flush replies: {}", e)))
    }
}

/// Request message as handed to a handler
#[derive(Debug, Clone)]
pub struct Inbound {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Vec<u8>,
}

impl From<Message> for Inbound {
    fn from(message: Message) -> Self {
        Self {
            subject: message.subject.to_string(),
            reply: message.reply.map(|r| r.to_string()),
            payload: message.payload.to_vec(),
        }
    }
}

pub struct RequestLoop<S> {
    sink: Arc<S>,
    dispatcher: Arc<Dispatcher>,
    permits: Arc<Semaphore>,
    max_in_flight: u32,
}

impl<S: ReplySink> RequestLoop<S> {
    pub fn new(sink: Arc<S>, dispatcher: Arc<Dispatcher>, max_in_flight: usize) -> Self {
        let max_in_flight = u32::try_from(max_in_flight).unwrap_or(u32::MAX).max(1);
        Self {
            sink,
            dispatcher,
            permits: Arc::new(Semaphore::new(max_in_flight as usize)),
            max_in_flight,
        }
    }

    /// Serve until `shutdown` turns true or the subscription ends
    pub async fn run(&self, mut subscriber: Subscriber, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                message = subscriber.next() => match message {
                    Some(message) => self.spawn_handler(message.into()).await?,
                    None => {
                        warn!("Request subscription closed by the server");
                        break;
                    }
                },
            }
        }

        if let Err(e) = subscriber.unsubscribe().await {
            warn!(error = %e, "Failed to unsubscribe");
        }
        self.drain().await
    }

    /// Handle one message on its own task; waits while the pool is full
    pub async fn spawn_handler(&self, message: Inbound) -> Result<()> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| VigilError::Internal(format!("handler pool closed: {}", e)))?;

        let sink = self.sink.clone();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let response = dispatcher.handle_payload(&message.payload).await;

            match message.reply {
                Some(reply) => {
                    debug!(reply = %reply, success = response.is_success(), "Publishing reply");
                    if let Err(e) = sink.send_reply(reply, response.to_bytes()).await {
                        warn!(subject = %message.subject, error = %e, "Failed to publish reply");
                    }
                }
                None => {
                    warn!(subject = %message.subject, "Request has no reply subject, answer dropped");
                }
            }
        });

        Ok(())
    }

    /// Wait for every handler to finish, then flush pending replies
    pub async fn drain(&self) -> Result<()> {
        let _all = self
            .permits
            .acquire_many(self.max_in_flight)
            .await
            .map_err(|e| VigilError::Internal(format!("handler pool closed: {}", e)))?;

        self.sink.flush_replies().await?;

        info!("Request loop drained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::FluxQuery;
    use crate::store::QueryStore;
    use parking_lot::Mutex;
    use std::time::Duration;
    use vigil_influx::FluxTable;

    /// Answers every query with no rows after a delay
    struct SlowStore(Duration);

    #[async_trait]
    impl QueryStore for SlowStore {
        async fn execute(&self, _query: &FluxQuery) -> vigil_influx::Result<Vec<FluxTable>> {
            tokio::time::sleep(self.0).await;
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        replies: Mutex<Vec<(String, Vec<u8>)>>,
        flushes: Mutex<usize>,
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn send_reply(&self, subject: String, payload: Vec<u8>) -> Result<()> {
            self.replies.lock().push((subject, payload));
            Ok(())
        }

        async fn flush_replies(&self) -> Result<()> {
            *self.flushes.lock() += 1;
            Ok(())
        }
    }

    fn request_loop(
        delay: Duration,
        max_in_flight: usize,
    ) -> (RequestLoop<RecordingSink>, Arc<RecordingSink>, Arc<Dispatcher>) {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(SlowStore(delay)), "telemetry"));
        let requests = RequestLoop::new(sink.clone(), dispatcher.clone(), max_in_flight);
        (requests, sink, dispatcher)
    }

    fn inbound(reply: Option<&str>) -> Inbound {
        Inbound {
            subject: "reader.query".into(),
            reply: reply.map(str::to_string),
            payload: br#"{"query_type": "alerts_critical", "params": {}}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_one_reply_per_request() {
        let (requests, sink, _) = request_loop(Duration::ZERO, 4);

        for i in 0..3 {
            requests.spawn_handler(inbound(Some(&format!("_INBOX.{}", i)))).await.unwrap();
        }
        requests.drain().await.unwrap();

        let mut subjects: Vec<String> = sink.replies.lock().iter().map(|(s, _)| s.clone()).collect();
        subjects.sort();
        assert_eq!(subjects, vec!["_INBOX.0", "_INBOX.1", "_INBOX.2"]);

        let replies = sink.replies.lock();
        let (_, body) = &replies[0];
        assert_eq!(
            String::from_utf8(body.clone()).unwrap(),
            r#"{"status":"success","data":[],"summary":[]}"#
        );
    }

    #[tokio::test]
    async fn test_no_reply_subject_is_handled_but_not_answered() {
        let (requests, sink, dispatcher) = request_loop(Duration::ZERO, 4);

        requests.spawn_handler(inbound(None)).await.unwrap();
        requests.drain().await.unwrap();

        assert!(sink.replies.lock().is_empty());
        assert_eq!(dispatcher.metrics().snapshot().requests, 1);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_handlers() {
        let (requests, sink, _) = request_loop(Duration::from_millis(50), 2);

        requests.spawn_handler(inbound(Some("_INBOX.slow"))).await.unwrap();
        requests.spawn_handler(inbound(Some("_INBOX.slower"))).await.unwrap();
        assert!(sink.replies.lock().is_empty());

        requests.drain().await.unwrap();

        assert_eq!(sink.replies.lock().len(), 2);
        assert_eq!(*sink.flushes.lock(), 1);
    }
}
