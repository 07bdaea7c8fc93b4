//! Publishes domain events to NATS under `flower_shop.<kind>`.

use crate::domain::events::DomainEvent;

pub const SUBJECT_PREFIX: &str = "flower_shop";

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Publisher that only logs events.
    pub fn disabled() -> Self { Self { nats: None } }

    pub async fn connect(url: &str) -> Self {
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url, "connected to NATS");
                Self::new(Some(client))
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "NATS unavailable, events will only be logged");
                Self::disabled()
            }
        }
    }

    pub fn subject(event: &DomainEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.kind()) }

    /// Best effort: a failed publish is logged and never fails the business operation.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = Self::subject(&event);
            let Some(client) = &self.nats else {
                tracing::debug!(%subject, ?event, "domain event");
                continue;
            };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(%subject, error = %e, "failed to encode domain event");
                    continue;
                }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "failed to publish domain event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::DebtEvent;
    use rust_decimal::Decimal;

    #[test]
    fn test_subject_and_payload() {
        let event = DomainEvent::Debt(DebtEvent::PaymentApplied { debt_id: "D1".into(), amount: Decimal::from(10), remaining: Decimal::from(5) });
        assert_eq!(EventPublisher::subject(&event), "flower_shop.debt.payment_applied");
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["aggregate"], "debt");
        assert_eq!(json["event"]["type"], "payment_applied");
    }

    #[tokio::test]
    async fn test_disabled_publisher_swallows_events() {
        EventPublisher::disabled().publish_all(vec![DomainEvent::Debt(DebtEvent::Settled { debt_id: "D1".into(), customer_id: "C1".into() })]).await;
    }
}
