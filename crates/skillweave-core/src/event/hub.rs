//! Per-workflow event hub.
//!
//! Every workflow gets its own channel holding an append-only event log,
//! synchronous callbacks, and unbounded subscriber queues. Subscribers and
//! callbacks see events in log order, even with concurrent publishers.
//!
//! Callbacks run outside the map lock, so a callback may query the hub or
//! publish. Only one thread delivers to a workflow's callbacks at a time; a
//! publish made while delivery is in progress is queued and handed to the
//! callbacks by the delivering thread.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use skillweave_types::event::WorkflowEvent;

/// Callback invoked synchronously for each event of one workflow.
pub type EventListener = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

#[derive(Default)]
struct Channel {
    log: Vec<WorkflowEvent>,
    listeners: Vec<EventListener>,
    subscribers: Vec<mpsc::UnboundedSender<WorkflowEvent>>,
    undelivered: VecDeque<WorkflowEvent>,
    delivering: bool,
}

/// Releases the delivery slot if a callback unwinds.
struct DeliverySlot<'a> {
    channels: &'a DashMap<Uuid, Channel>,
    workflow_id: Uuid,
    held: bool,
}

impl Drop for DeliverySlot<'_> {
    fn drop(&mut self) {
        if self.held {
            if let Some(mut channel) = self.channels.get_mut(&self.workflow_id) {
                channel.undelivered.clear();
                channel.delivering = false;
            }
        }
    }
}

/// Typed publish/subscribe keyed by workflow id.
#[derive(Default)]
pub struct WorkflowEventHub {
    channels: DashMap<Uuid, Channel>,
}

impl WorkflowEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `workflow_id`.
    pub fn add_listener<F>(&self, workflow_id: Uuid, listener: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.channels
            .entry(workflow_id)
            .or_default()
            .listeners
            .push(Arc::new(listener));
    }

    /// Open a channel receiving every future event of `workflow_id`.
    pub fn subscribe(&self, workflow_id: Uuid) -> mpsc::UnboundedReceiver<WorkflowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .entry(workflow_id)
            .or_default()
            .subscribers
            .push(tx);
        rx
    }

    /// Record `event` and deliver it.
    ///
    /// Subscribers whose receiver was dropped are pruned. If another publish
    /// of the same workflow is delivering to callbacks, `event` is queued
    /// behind it and this call returns without running any callback.
    pub fn publish(&self, event: WorkflowEvent) {
        let workflow_id = event.workflow_id;
        {
            let mut channel = self.channels.entry(workflow_id).or_default();
            channel.log.push(event.clone());
            channel
                .subscribers
                .retain(|tx| tx.send(event.clone()).is_ok());

            tracing::trace!(
                workflow_id = %workflow_id,
                event_type = %event.event_type,
                listeners = channel.listeners.len(),
                "published workflow event"
            );

            if channel.listeners.is_empty() && !channel.delivering {
                return;
            }
            channel.undelivered.push_back(event);
            if channel.delivering {
                return;
            }
            channel.delivering = true;
        }

        let mut slot = DeliverySlot {
            channels: &self.channels,
            workflow_id,
            held: true,
        };
        loop {
            let (next, listeners) = {
                let Some(mut channel) = self.channels.get_mut(&workflow_id) else {
                    slot.held = false;
                    return;
                };
                match channel.undelivered.pop_front() {
                    Some(next) => (next, channel.listeners.clone()),
                    None => {
                        channel.delivering = false;
                        slot.held = false;
                        return;
                    }
                }
            };
            for listener in listeners {
                listener(&next);
            }
        }
    }

    /// Full event log of `workflow_id`, oldest first.
    pub fn events(&self, workflow_id: Uuid) -> Vec<WorkflowEvent> {
        self.channels
            .get(&workflow_id)
            .map(|c| c.log.clone())
            .unwrap_or_default()
    }

    /// Drop the log, listeners, and subscribers of `workflow_id`.
    ///
    /// Open subscriber receivers see the channel close.
    pub fn remove(&self, workflow_id: Uuid) {
        self.channels.remove(&workflow_id);
    }

    pub fn listener_count(&self, workflow_id: Uuid) -> usize {
        self.channels
            .get(&workflow_id)
            .map(|c| c.listeners.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for WorkflowEventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEventHub")
            .field("workflows", &self.channels.len())
            .finish()
    }
}
