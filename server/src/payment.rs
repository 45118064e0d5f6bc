//! Payment collaborator seam.
//!
//! Booking never collects money itself: it asks the collaborator for a
//! handoff (an id plus a redirect URL) and stores the id on the pending
//! order so a later payment confirmation can be matched back to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct HandoffLine {
    /// `None` for general admission.
    pub ticket_kind_id: Option<Uuid>,
    pub description: String,
    pub quantity: u32,
    pub unit_amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffRequest {
    pub order_id: Uuid,
    pub order_reference: String,
    pub buyer_id: Uuid,
    pub lines: Vec<HandoffLine>,
    pub success_callback: String,
    pub cancel_callback: String,
    pub metadata: BTreeMap<String, String>,
}

impl HandoffRequest {
    pub fn total_amount(&self) -> i64 {
        self.lines
            .iter()
            .map(|line| line.unit_amount * i64::from(line.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentHandoff {
    pub handoff_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Error)]
pub enum PaymentCollaboratorError {
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("payment provider rejected the handoff: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PaymentCollaborator: Send + Sync {
    async fn create_handoff(
        &self,
        request: HandoffRequest,
    ) -> Result<PaymentHandoff, PaymentCollaboratorError>;
}

/// Collaborator that hands out local checkout URLs without contacting any
/// provider. Used for development and tests.
#[derive(Debug, Clone)]
pub struct MockPaymentCollaborator {
    checkout_base_url: String,
}

impl MockPaymentCollaborator {
    pub fn new(checkout_base_url: impl Into<String>) -> Self {
        Self {
            checkout_base_url: checkout_base_url.into(),
        }
    }

    pub fn shared(checkout_base_url: impl Into<String>) -> Arc<dyn PaymentCollaborator> {
        Arc::new(Self::new(checkout_base_url))
    }
}

impl Default for MockPaymentCollaborator {
    fn default() -> Self {
        Self::new("http://localhost:3001/checkout")
    }
}

#[async_trait]
impl PaymentCollaborator for MockPaymentCollaborator {
    async fn create_handoff(
        &self,
        request: HandoffRequest,
    ) -> Result<PaymentHandoff, PaymentCollaboratorError> {
        if request.lines.is_empty() {
            return Err(PaymentCollaboratorError::Rejected(
                "handoff has no line items".to_string(),
            ));
        }

        let handoff_id = format!("mock_handoff_{}", Uuid::new_v4().simple());

        tracing::info!(
            order_id = %request.order_id,
            amount = request.total_amount(),
            handoff_id = %handoff_id,
            "Mock payment handoff created"
        );

        Ok(PaymentHandoff {
            redirect_url: format!("{}/{}", self.checkout_base_url.trim_end_matches('/'), handoff_id),
            handoff_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lines: Vec<HandoffLine>) -> HandoffRequest {
        HandoffRequest {
            order_id: Uuid::new_v4(),
            order_reference: "ORD-12345678".to_string(),
            buyer_id: Uuid::new_v4(),
            lines,
            success_callback: "https://shop.test/paid".to_string(),
            cancel_callback: "https://shop.test/cancelled".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_handoff_success() {
        let collaborator = MockPaymentCollaborator::new("https://pay.test/checkout/");
        let handoff = collaborator
            .create_handoff(request(vec![HandoffLine {
                ticket_kind_id: Some(Uuid::new_v4()),
                description: "VIP".to_string(),
                quantity: 2,
                unit_amount: 4_000,
                currency: "USD".to_string(),
            }]))
            .await
            .unwrap();

        assert!(handoff.handoff_id.starts_with("mock_handoff_"));
        assert_eq!(
            handoff.redirect_url,
            format!("https://pay.test/checkout/{}", handoff.handoff_id)
        );
    }

    #[tokio::test]
    async fn test_mock_handoff_rejects_empty_order() {
        let collaborator = MockPaymentCollaborator::default();
        let result = collaborator.create_handoff(request(Vec::new())).await;
        assert!(matches!(result, Err(PaymentCollaboratorError::Rejected(_))));
    }

    #[test]
    fn test_total_amount_sums_lines() {
        let line = |quantity, unit_amount| HandoffLine {
            ticket_kind_id: None,
            description: "GA".to_string(),
            quantity,
            unit_amount,
            currency: "USD".to_string(),
        };
        assert_eq!(request(vec![line(2, 8_000), line(1, 500)]).total_amount(), 16_500);
    }
}
