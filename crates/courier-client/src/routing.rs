// Routing-key and priority strategies applied to outbound commands.
use crate::message::CommandMessage;

/// Picks the string the router hashes to select a target node.
pub trait RoutingStrategy: Send + Sync {
    fn routing_key(&self, message: &CommandMessage) -> String;
}

impl<F> RoutingStrategy for F
where
    F: Fn(&CommandMessage) -> String + Send + Sync,
{
    fn routing_key(&self, message: &CommandMessage) -> String {
        self(message)
    }
}

/// Assigns the dispatch priority carried as a processing instruction.
pub trait PriorityCalculator: Send + Sync {
    fn priority(&self, message: &CommandMessage) -> i64;
}

impl<F> PriorityCalculator for F
where
    F: Fn(&CommandMessage) -> i64 + Send + Sync,
{
    fn priority(&self, message: &CommandMessage) -> i64 {
        self(message)
    }
}

/// Routes every command by its own identifier, spreading load evenly.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierRoutingStrategy;

impl RoutingStrategy for IdentifierRoutingStrategy {
    fn routing_key(&self, message: &CommandMessage) -> String {
        message.identifier().to_string()
    }
}

/// Routes by a metadata entry, falling back to the message identifier when
/// the entry is absent or not a string.
#[derive(Debug, Clone)]
pub struct MetadataRoutingStrategy {
    key: String,
}

impl MetadataRoutingStrategy {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl RoutingStrategy for MetadataRoutingStrategy {
    fn routing_key(&self, message: &CommandMessage) -> String {
        message
            .metadata()
            .get(&self.key)
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .unwrap_or_else(|| message.identifier().to_string())
    }
}

/// Every command runs at priority 0 unless the caller says otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPriorityCalculator;

impl PriorityCalculator for DefaultPriorityCalculator {
    fn priority(&self, _message: &CommandMessage) -> i64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_strategy_prefers_the_entry() {
        let strategy = MetadataRoutingStrategy::new("aggregate");
        let message = CommandMessage::new("createOrder", serde_json::json!(null))
            .and_metadata("aggregate", serde_json::json!("order-7"));
        assert_eq!(strategy.routing_key(&message), "order-7");
    }

    #[test]
    fn metadata_strategy_falls_back_to_identifier() {
        let strategy = MetadataRoutingStrategy::new("aggregate");
        let message = CommandMessage::new("createOrder", serde_json::json!(null));
        assert_eq!(strategy.routing_key(&message), message.identifier());
    }

    #[test]
    fn closures_are_valid_strategies() {
        let strategy = |message: &CommandMessage| message.name().to_string();
        let calculator = |_: &CommandMessage| 5i64;
        let message = CommandMessage::new("createOrder", serde_json::json!(null));
        assert_eq!(strategy.routing_key(&message), "createOrder");
        assert_eq!(calculator.priority(&message), 5);
    }
}
