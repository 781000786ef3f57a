// Flow-controlled wrapper over the outbound command stream.
use std::sync::Mutex;
use tracing::debug;

use courier_wire::ClientMessage;

use crate::connection::{ConnectionError, OutboundStream};

/// Counts acknowledged inbound work (the command responses this client has
/// produced) and replenishes the router's permits every
/// `new_permits_threshold` of them. The counter guard doubles as the send
/// monitor so a grant is never interleaved with the response that earned it.
pub(crate) struct FlowControlledStream {
    outbound: OutboundStream,
    initial_permits: u64,
    new_permits: u64,
    new_permits_threshold: u64,
    counted: fn(&ClientMessage) -> bool,
    since_last_grant: Mutex<u64>,
}

impl FlowControlledStream {
    pub(crate) fn new(
        outbound: OutboundStream,
        initial_permits: u64,
        new_permits: u64,
        new_permits_threshold: u64,
        counted: fn(&ClientMessage) -> bool,
    ) -> Self {
        Self {
            outbound,
            initial_permits,
            new_permits,
            new_permits_threshold,
            counted,
            since_last_grant: Mutex::new(0),
        }
    }

    /// One-time grant sent when the stream opens, before any other traffic.
    pub(crate) fn send_initial_permits(&self) -> Result<(), ConnectionError> {
        let _guard = self.since_last_grant.lock().expect("flow control lock");
        debug!(permits = self.initial_permits, "granting initial permits");
        self.outbound.send(ClientMessage::FlowControl {
            permits: self.initial_permits,
        })
    }

    pub(crate) fn send(&self, message: ClientMessage) -> Result<(), ConnectionError> {
        let mut since_last_grant = self.since_last_grant.lock().expect("flow control lock");
        let counted = (self.counted)(&message);
        self.outbound.send(message)?;
        if counted {
            *since_last_grant += 1;
            if *since_last_grant >= self.new_permits_threshold {
                *since_last_grant = 0;
                debug!(permits = self.new_permits, "granting additional permits");
                self.outbound.send(ClientMessage::FlowControl {
                    permits: self.new_permits,
                })?;
            }
        }
        Ok(())
    }

    pub(crate) fn complete(&self) {
        self.outbound.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OutboundItem;
    use courier_wire::WireCommandResponse;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn response(id: &str) -> ClientMessage {
        ClientMessage::CommandResponse(WireCommandResponse {
            message_id: id.to_string(),
            request_id: "c-1".to_string(),
            payload: None,
            error_code: None,
            error_message: None,
        })
    }

    fn counted(message: &ClientMessage) -> bool {
        matches!(message, ClientMessage::CommandResponse(_))
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundItem>) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let OutboundItem::Message(message) = item {
                messages.push(message);
            }
        }
        messages
    }

    fn grants(messages: &[ClientMessage]) -> Vec<u64> {
        messages
            .iter()
            .filter_map(|message| match message {
                ClientMessage::FlowControl { permits } => Some(*permits),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn initial_permits_are_granted_exactly_once() {
        let (outbound, mut rx) = OutboundStream::new();
        let stream = FlowControlledStream::new(outbound, 100, 10, 5, counted);
        stream.send_initial_permits().expect("initial permits");
        assert_eq!(grants(&drain(&mut rx)), vec![100]);
    }

    #[tokio::test]
    async fn threshold_responses_trigger_one_replenishment() {
        let (outbound, mut rx) = OutboundStream::new();
        let stream = FlowControlledStream::new(outbound, 100, 10, 3, counted);
        for i in 0..3 {
            stream.send(response(&format!("r-{i}"))).expect("send");
        }
        let messages = drain(&mut rx);
        assert_eq!(grants(&messages), vec![10]);
        // The grant follows the third response on the wire.
        assert!(matches!(
            messages.last(),
            Some(ClientMessage::FlowControl { permits: 10 })
        ));
    }

    #[tokio::test]
    async fn counter_resets_after_each_grant() {
        let (outbound, mut rx) = OutboundStream::new();
        let stream = FlowControlledStream::new(outbound, 100, 10, 2, counted);
        for i in 0..6 {
            stream.send(response(&format!("r-{i}"))).expect("send");
        }
        assert_eq!(grants(&drain(&mut rx)), vec![10, 10, 10]);
    }

    #[tokio::test]
    async fn uncounted_messages_do_not_earn_permits() {
        let (outbound, mut rx) = OutboundStream::new();
        let stream = FlowControlledStream::new(outbound, 100, 10, 1, counted);
        stream
            .send(ClientMessage::Subscribe(courier_wire::CommandSubscription {
                command_name: "testCommand".to_string(),
                client_id: "client-1".to_string(),
                component_name: "orders".to_string(),
                message_id: "m-1".to_string(),
            }))
            .expect("send");
        assert!(grants(&drain(&mut rx)).is_empty());
    }
}
