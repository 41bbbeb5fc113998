//! In-process queue channel
//!
//! Models a managed broker: messages become invisible while a delivery is outstanding,
//! deliveries expire after the ack deadline, failed deliveries are redelivered after the
//! policy's backoff and exhausted messages move to the dead-letter list. With a
//! [`DeadLetterLog`] attached, dead letters are written through to it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use imagepipe_core::models::DeadLetterRecord;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use crate::dead_letter_log::DeadLetterLog;
use crate::queue::{
    Attributes, Delivery, MessageQueue, NackOutcome, QueueError, QueueStats, RedeliveryPolicy,
};

const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct Envelope {
    message_id: String,
    data: Bytes,
    attributes: Attributes,
    published_at: DateTime<Utc>,
    delivery_attempts: u32,
    visible_at: Instant,
}

#[derive(Debug)]
struct InFlight {
    envelope: Envelope,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Envelope>,
    in_flight: HashMap<String, InFlight>,
    /// Dead letters not yet written to the log (all of them when no log is attached)
    dead_letters: VecDeque<DeadLetterRecord>,
    published: u64,
    acked: u64,
}

pub struct MemoryQueue {
    channel: String,
    policy: RedeliveryPolicy,
    ack_deadline: Duration,
    state: Mutex<State>,
    notify: Notify,
    dead_letter_log: Option<Arc<dyn DeadLetterLog>>,
}

impl MemoryQueue {
    pub fn new(channel: impl Into<String>, policy: RedeliveryPolicy) -> Self {
        Self::with_ack_deadline(channel, policy, DEFAULT_ACK_DEADLINE)
    }

    pub fn with_ack_deadline(
        channel: impl Into<String>,
        policy: RedeliveryPolicy,
        ack_deadline: Duration,
    ) -> Self {
        Self {
            channel: channel.into(),
            policy,
            ack_deadline,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            dead_letter_log: None,
        }
    }

    /// Persist dead letters to `log` instead of keeping them in memory
    pub fn with_dead_letter_log(mut self, log: Arc<dyn DeadLetterLog>) -> Self {
        self.dead_letter_log = Some(log);
        self
    }

    pub fn policy(&self) -> &RedeliveryPolicy {
        &self.policy
    }

    fn to_dead_letter(&self, envelope: Envelope, reason: &str) -> DeadLetterRecord {
        DeadLetterRecord {
            message_id: envelope.message_id,
            channel: self.channel.clone(),
            payload: DeadLetterRecord::payload_from_bytes(&envelope.data),
            attributes: envelope.attributes,
            delivery_attempts: envelope.delivery_attempts,
            first_published_at: envelope.published_at,
            dead_lettered_at: Utc::now(),
            last_error: Some(reason.to_string()),
        }
    }

    /// Apply one failed attempt to an envelope that is no longer in flight
    fn fail_attempt(&self, state: &mut State, mut envelope: Envelope, reason: &str) -> NackOutcome {
        let attempt = envelope.delivery_attempts;

        if self.policy.should_dead_letter(attempt) {
            tracing::warn!(
                channel = %self.channel,
                message_id = %envelope.message_id,
                delivery_attempts = attempt,
                reason = %reason,
                "Message exhausted its delivery attempts, dead-lettering"
            );
            let record = self.to_dead_letter(envelope, reason);
            state.dead_letters.push_back(record);
            return NackOutcome::DeadLettered;
        }

        let after = self.policy.backoff(attempt);
        envelope.visible_at = Instant::now() + after;
        tracing::info!(
            channel = %self.channel,
            message_id = %envelope.message_id,
            delivery_attempt = attempt,
            backoff_secs = after.as_secs(),
            reason = %reason,
            "Message scheduled for redelivery"
        );
        state.ready.push_back(envelope);
        NackOutcome::Redelivered { after }
    }

    /// Write pending dead letters to the log. Records that fail stay pending and are
    /// retried on the next call.
    async fn persist_dead_letters(&self, state: &mut State) {
        let Some(log) = &self.dead_letter_log else {
            return;
        };

        while let Some(record) = state.dead_letters.front() {
            if let Err(e) = log.record(record).await {
                tracing::error!(
                    channel = %self.channel,
                    message_id = %record.message_id,
                    pending = state.dead_letters.len(),
                    error = %e,
                    "Failed to persist dead letter"
                );
                return;
            }
            state.dead_letters.pop_front();
        }
    }

    fn reclaim_expired_locked(&self, state: &mut State, now: Instant) -> usize {
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();

        for ack_id in &expired {
            if let Some(in_flight) = state.in_flight.remove(ack_id) {
                self.fail_attempt(state, in_flight.envelope, "ack deadline exceeded");
            }
        }
        expired.len()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn publish(&self, data: Bytes, attributes: Attributes) -> Result<String, QueueError> {
        let message_id = Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(Envelope {
                message_id: message_id.clone(),
                data,
                attributes,
                published_at: Utc::now(),
                delivery_attempts: 0,
                visible_at: Instant::now(),
            });
            state.published += 1;
        }
        self.notify.notify_one();

        tracing::debug!(channel = %self.channel, message_id = %message_id, "Message published");
        Ok(message_id)
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<Delivery>, QueueError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if self.reclaim_expired_locked(&mut state, now) > 0 {
            self.persist_dead_letters(&mut state).await;
        }

        let mut deliveries = Vec::new();
        let mut index = 0;
        while deliveries.len() < max_messages && index < state.ready.len() {
            if state.ready[index].visible_at > now {
                index += 1;
                continue;
            }
            let Some(mut envelope) = state.ready.remove(index) else {
                break;
            };
            envelope.delivery_attempts += 1;

            let ack_id = Uuid::new_v4().to_string();
            deliveries.push(Delivery {
                ack_id: ack_id.clone(),
                message_id: envelope.message_id.clone(),
                data: envelope.data.clone(),
                attributes: envelope.attributes.clone(),
                delivery_attempt: envelope.delivery_attempts,
                published_at: envelope.published_at,
            });
            state.in_flight.insert(
                ack_id,
                InFlight {
                    envelope,
                    deadline: now + self.ack_deadline,
                },
            );
        }

        Ok(deliveries)
    }

    async fn ack(&self, ack_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.in_flight.remove(ack_id) {
            Some(_) => {
                state.acked += 1;
                Ok(())
            }
            None => Err(QueueError::UnknownAckId(ack_id.to_string())),
        }
    }

    async fn nack(&self, ack_id: &str, reason: &str) -> Result<NackOutcome, QueueError> {
        let outcome = {
            let mut state = self.state.lock().await;
            let in_flight = state
                .in_flight
                .remove(ack_id)
                .ok_or_else(|| QueueError::UnknownAckId(ack_id.to_string()))?;
            let outcome = self.fail_attempt(&mut state, in_flight.envelope, reason);
            if outcome == NackOutcome::DeadLettered {
                self.persist_dead_letters(&mut state).await;
            }
            outcome
        };
        self.notify.notify_one();
        Ok(outcome)
    }

    async fn dead_letter(&self, ack_id: &str, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let in_flight = state
            .in_flight
            .remove(ack_id)
            .ok_or_else(|| QueueError::UnknownAckId(ack_id.to_string()))?;

        tracing::warn!(
            channel = %self.channel,
            message_id = %in_flight.envelope.message_id,
            reason = %reason,
            "Message dead-lettered"
        );
        let record = self.to_dead_letter(in_flight.envelope, reason);
        state.dead_letters.push_back(record);
        self.persist_dead_letters(&mut state).await;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetterRecord>, QueueError> {
        let state = self.state.lock().await;
        let mut records = match &self.dead_letter_log {
            Some(log) => log
                .list(&self.channel)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?,
            None => Vec::new(),
        };
        records.extend(state.dead_letters.iter().cloned());
        Ok(records)
    }

    async fn dead_letter_undelivered(&self, reason: &str) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let in_flight: Vec<Envelope> = state.in_flight.drain().map(|(_, f)| f.envelope).collect();
        let ready: Vec<Envelope> = state.ready.drain(..).collect();

        let count = in_flight.len() + ready.len();
        for envelope in in_flight.into_iter().chain(ready) {
            let record = self.to_dead_letter(envelope, reason);
            state.dead_letters.push_back(record);
        }
        self.persist_dead_letters(&mut state).await;

        if count > 0 {
            tracing::warn!(
                channel = %self.channel,
                count = count,
                reason = %reason,
                "Undelivered messages moved to dead letters"
            );
        }
        Ok(count)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let dead_lettered = self.dead_letters().await?.len();
        let state = self.state.lock().await;
        Ok(QueueStats {
            channel: self.channel.clone(),
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
            dead_lettered,
            published: state.published,
            acked: state.acked,
        })
    }

    async fn reclaim_expired(&self) -> Result<usize, QueueError> {
        let reclaimed = {
            let mut state = self.state.lock().await;
            let reclaimed = self.reclaim_expired_locked(&mut state, Instant::now());
            if reclaimed > 0 {
                self.persist_dead_letters(&mut state).await;
            }
            reclaimed
        };
        if reclaimed > 0 {
            tracing::warn!(
                channel = %self.channel,
                reclaimed = reclaimed,
                "Reclaimed deliveries past their ack deadline"
            );
            self.notify.notify_one();
        }
        Ok(reclaimed)
    }

    async fn wait_for_messages(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;
    }
}
