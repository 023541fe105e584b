//! Live notification fan-out.
//!
//! Every authenticated WebSocket connection registers a bounded queue under
//! its user id. Sending an event pushes it into each queue for that user
//! without waiting; users with no live connection simply miss the event.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::db::now_timestamp;

/// Characters of message content shown in a new-message notification
const MESSAGE_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewMessage,
    NewProposal,
    ProposalStatus,
    NewAppointment,
    AppointmentStatus,
    NewReview,
    PaymentReceived,
    JobStatus,
}

/// JSON payload pushed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Stamped by the hub when the event is sent
    #[serde(default)]
    pub timestamp: String,
}

impl NotificationEvent {
    pub fn new(event_type: EventType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type,
            title: title.into(),
            message: message.into(),
            sender_id: None,
            receiver_id: None,
            data: None,
            timestamp: String::new(),
        }
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_receiver(mut self, receiver_id: impl Into<String>) -> Self {
        self.receiver_id = Some(receiver_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Handle returned to a newly registered connection
#[derive(Debug)]
pub struct Registration {
    pub id: u64,
    pub user_id: String,
    pub receiver: mpsc::Receiver<NotificationEvent>,
}

/// Registry of live connections keyed by user id
#[derive(Debug)]
pub struct NotificationHub {
    connections: DashMap<String, HashMap<u64, mpsc::Sender<NotificationEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl NotificationHub {
    /// `buffer` is the number of events queued per connection before
    /// further events to it are dropped
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn register(&self, user_id: &str) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections
            .entry(user_id.to_string())
            .or_default()
            .insert(id, tx);

        info!(user_id = %user_id, connection_id = id, "Notification connection registered");
        Registration {
            id,
            user_id: user_id.to_string(),
            receiver: rx,
        }
    }

    pub fn unregister(&self, user_id: &str, connection_id: u64) {
        if let Some(mut conns) = self.connections.get_mut(user_id) {
            conns.remove(&connection_id);
        }
        self.connections.remove_if(user_id, |_, conns| conns.is_empty());
        info!(user_id = %user_id, connection_id, "Notification connection unregistered");
    }

    /// Deliver `event` to every live connection of `user_id`.
    ///
    /// Returns `true` if at least one connection accepted it. Never blocks:
    /// a full queue drops the event for that connection only, and a closed
    /// one is pruned.
    pub fn send(&self, user_id: &str, mut event: NotificationEvent) -> bool {
        event.timestamp = now_timestamp();

        let mut delivered = false;
        {
            let Some(mut conns) = self.connections.get_mut(user_id) else {
                debug!(user_id = %user_id, event = ?event.event_type, "User offline, notification dropped");
                return false;
            };

            conns.retain(|id, tx| match tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered = true;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    debug!(user_id = %user_id, connection_id = *id, "Connection queue full, notification dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(user_id = %user_id, connection_id = *id, "Pruning closed connection");
                    false
                }
            });
        }
        self.connections.remove_if(user_id, |_, conns| conns.is_empty());

        delivered
    }

    /// Send to each user independently; returns how many were reached
    pub fn broadcast(&self, user_ids: &[String], event: NotificationEvent) -> usize {
        user_ids
            .iter()
            .filter(|user_id| self.send(user_id, event.clone()))
            .count()
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.connections.get(user_id).map(|c| c.len()).unwrap_or(0)
    }

    pub fn online_user_count(&self) -> usize {
        self.connections.len()
    }

    pub fn notify_new_message(
        &self,
        receiver_id: &str,
        sender_id: &str,
        sender_name: &str,
        content: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::NewMessage,
            format!("New message from {}", sender_name),
            preview(content),
        )
        .with_sender(sender_id)
        .with_receiver(receiver_id);
        self.send(receiver_id, event)
    }

    pub fn notify_new_proposal(
        &self,
        client_id: &str,
        freelancer_id: &str,
        job_id: &str,
        job_title: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::NewProposal,
            "New proposal received",
            format!("You received a new proposal for \"{}\"", job_title),
        )
        .with_sender(freelancer_id)
        .with_receiver(client_id)
        .with_data(json!({ "jobId": job_id }));
        self.send(client_id, event)
    }

    pub fn notify_proposal_status(
        &self,
        freelancer_id: &str,
        proposal_id: &str,
        job_title: &str,
        status: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::ProposalStatus,
            format!("Proposal {}", status),
            format!("Your proposal for \"{}\" was {}", job_title, status),
        )
        .with_receiver(freelancer_id)
        .with_data(json!({ "proposalId": proposal_id, "status": status }));
        self.send(freelancer_id, event)
    }

    pub fn notify_new_appointment(
        &self,
        freelancer_id: &str,
        client_id: &str,
        appointment_id: &str,
        service_title: &str,
        start_time: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::NewAppointment,
            "New appointment booked",
            format!("\"{}\" was booked for {}", service_title, start_time),
        )
        .with_sender(client_id)
        .with_receiver(freelancer_id)
        .with_data(json!({ "appointmentId": appointment_id }));
        self.send(freelancer_id, event)
    }

    pub fn notify_appointment_status(
        &self,
        user_id: &str,
        appointment_id: &str,
        service_title: &str,
        status: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::AppointmentStatus,
            format!("Appointment {}", status),
            format!("Your appointment for \"{}\" is now {}", service_title, status),
        )
        .with_receiver(user_id)
        .with_data(json!({ "appointmentId": appointment_id, "status": status }));
        self.send(user_id, event)
    }

    pub fn notify_new_review(
        &self,
        freelancer_id: &str,
        client_id: &str,
        review_id: &str,
        rating: i64,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::NewReview,
            "New review",
            format!("You received a {}-star review", rating),
        )
        .with_sender(client_id)
        .with_receiver(freelancer_id)
        .with_data(json!({ "reviewId": review_id, "rating": rating }));
        self.send(freelancer_id, event)
    }

    pub fn notify_payment_received(
        &self,
        freelancer_id: &str,
        client_id: &str,
        amount: f64,
        description: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::PaymentReceived,
            "Payment received",
            format!("You received ${:.2} for {}", amount, description),
        )
        .with_sender(client_id)
        .with_receiver(freelancer_id)
        .with_data(json!({ "amount": amount }));
        self.send(freelancer_id, event)
    }

    pub fn notify_job_status(
        &self,
        freelancer_id: &str,
        job_id: &str,
        job_title: &str,
        status: &str,
    ) -> bool {
        let event = NotificationEvent::new(
            EventType::JobStatus,
            format!("Job {}", status.replace('_', " ")),
            format!("\"{}\" is now {}", job_title, status.replace('_', " ")),
        )
        .with_receiver(freelancer_id)
        .with_data(json!({ "jobId": job_id, "status": status }));
        self.send(freelancer_id, event)
    }
}

/// First 50 characters of `content`, with "..." when it was cut
fn preview(content: &str) -> String {
    if content.chars().count() > MESSAGE_PREVIEW_CHARS {
        let cut: String = content.chars().take(MESSAGE_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> NotificationEvent {
        NotificationEvent::new(EventType::NewReview, "title", "message")
    }

    #[test]
    fn test_send_without_connections_is_not_delivered() {
        let hub = NotificationHub::new(4);
        assert!(!hub.send("nobody", event()));
        assert_eq!(hub.online_user_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_connection() {
        let hub = NotificationHub::new(4);
        let mut first = hub.register("u1");
        let mut second = hub.register("u1");
        assert_eq!(hub.connection_count("u1"), 2);
        assert_eq!(hub.online_user_count(), 1);

        assert!(hub.send("u1", event()));

        let a = first.receiver.recv().await.unwrap();
        let b = second.receiver.recv().await.unwrap();
        assert_eq!(a, b);
        assert!(a.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_unregister_removes_empty_users() {
        let hub = NotificationHub::new(4);
        let first = hub.register("u1");
        let second = hub.register("u1");

        hub.unregister("u1", first.id);
        assert_eq!(hub.connection_count("u1"), 1);
        hub.unregister("u1", second.id);
        assert_eq!(hub.connection_count("u1"), 0);
        assert_eq!(hub.online_user_count(), 0);
    }

    #[test]
    fn test_closed_connections_are_pruned_on_send() {
        let hub = NotificationHub::new(4);
        let live = hub.register("u1");
        let dead = hub.register("u1");
        drop(dead.receiver);

        assert!(hub.send("u1", event()));
        assert_eq!(hub.connection_count("u1"), 1);

        drop(live.receiver);
        assert!(!hub.send("u1", event()));
        assert_eq!(hub.online_user_count(), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking_other_connections() {
        let hub = NotificationHub::new(1);
        let mut slow = hub.register("u1");
        let mut fast = hub.register("u1");

        assert!(hub.send("u1", event()));
        assert!(fast.receiver.try_recv().is_ok());

        // slow still holds the first event, so only fast can take this one
        assert!(hub.send("u1", event()));
        assert!(fast.receiver.try_recv().is_ok());
        assert!(slow.receiver.try_recv().is_ok());
        assert!(slow.receiver.try_recv().is_err());
        assert_eq!(hub.connection_count("u1"), 2);
    }

    #[test]
    fn test_broadcast_counts_reached_users() {
        let hub = NotificationHub::new(4);
        let _a = hub.register("a");
        let _c = hub.register("c");
        let reached = hub.broadcast(&["a".into(), "b".into(), "c".into()], event());
        assert_eq!(reached, 2);
    }

    #[test]
    fn test_message_preview_truncates_at_fifty_chars() {
        let short = "see you tomorrow";
        assert_eq!(preview(short), short);

        let exact = "x".repeat(50);
        assert_eq!(preview(&exact), exact);

        let long = "é".repeat(60);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), 53);
        assert!(cut.ends_with("..."));
    }

    #[tokio::test]
    async fn test_new_message_event_wire_format() {
        let hub = NotificationHub::new(4);
        let mut reg = hub.register("bob");
        assert!(hub.notify_new_message("bob", "ana", "Ana", "hello"));

        let event = reg.receiver.recv().await.unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "new_message");
        assert_eq!(value["title"], "New message from Ana");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["senderId"], "ana");
        assert_eq!(value["receiverId"], "bob");
        assert!(value.get("data").is_none());
        assert!(value["timestamp"].is_string());
    }
}
