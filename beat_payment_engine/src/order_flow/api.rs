use std::fmt::Debug;

use bpg_common::USD_CURRENCY_CODE;
use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    db_types::{LicenseType, NewOrder, OrderId, OrderStatus},
    order_flow::{
        errors::OrderFlowError,
        matcher,
        objects::{
            CheckoutSnapshot,
            CompletionOutcome,
            DisputeSnapshot,
            MatchOutcome,
            MatchRefs,
            PaymentFailureSnapshot,
            RefundSnapshot,
            TransitionOutcome,
        },
        reconciler,
    },
    traits::{
        CatalogReader,
        EmailTemplate,
        GatewayClient,
        MultiOrderSettlement,
        NotificationService,
        PaidOrderUpdate,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        TransitionUpdate,
    },
};

/// The order state machine.
///
/// One instance handles one webhook delivery at a time; all state lives in the injected collaborators. Every
/// operation re-reads current order state through the matcher and writes through conditional (compare-and-swap)
/// store operations, so concurrent deliveries and redeliveries converge instead of racing.
pub struct OrderFlowApi<B, C, G, N> {
    db: B,
    catalog: C,
    gateway: G,
    notifier: N,
}

impl<B, C, G, N> Debug for OrderFlowApi<B, C, G, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, C, G, N> OrderFlowApi<B, C, G, N> {
    pub fn new(db: B, catalog: C, gateway: G, notifier: N) -> Self {
        Self { db, catalog, gateway, notifier }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, C, G, N> OrderFlowApi<B, C, G, N>
where
    B: PaymentGatewayDatabase,
    C: CatalogReader,
    G: GatewayClient,
    N: NotificationService,
{
    /// Handle a `session-completed` event: transition the matched order to `Paid`, reconciling line items on the
    /// multi-item path, or synthesize a brand-new paid order if nothing matches.
    pub async fn process_session_completed(
        &self,
        snapshot: CheckoutSnapshot,
    ) -> Result<CompletionOutcome, OrderFlowError> {
        let outcome = matcher::resolve_order(&self.db, &snapshot.match_refs(), false).await?;
        match outcome {
            MatchOutcome::Multi(order) => self.settle_multi_order(order.id, &snapshot).await,
            MatchOutcome::Single(order) => self.pay_single_order(order.id, Some(order.license_type), &snapshot).await,
            MatchOutcome::Unmatched => self.synthesize_order(&snapshot).await,
        }
    }

    async fn pay_single_order(
        &self,
        id: OrderId,
        stored_license: Option<LicenseType>,
        snapshot: &CheckoutSnapshot,
    ) -> Result<CompletionOutcome, OrderFlowError> {
        // Prefer the license the gateway reported at payment time over the one stored at checkout initiation.
        let license = snapshot.license_type.or(stored_license).unwrap_or_default();
        let update = PaidOrderUpdate {
            paid_at: Utc::now(),
            payment_id: Some(snapshot.session_id.clone()),
            payment_intent_id: snapshot.payment_intent_id.clone(),
            contact: snapshot.contact.clone(),
            total_amount: snapshot.amount_total,
            currency: snapshot.currency.clone(),
            payment_method: snapshot.payment_method.clone(),
            license_type: Some(license),
            usage_rights: license.usage_rights(),
        };
        match self.db.mark_order_paid(&id, update).await? {
            Some(order) => {
                info!("🔄️ Order {} marked as paid ({} {})", order.id, order.total_amount, order.currency);
                let data = json!({
                    "order_id": order.id.as_str(),
                    "total_amount": order.total_amount.to_string(),
                    "license_type": order.license_type.to_string(),
                });
                self.try_notify(&order.customer_email, EmailTemplate::PaymentConfirmation, data).await;
                Ok(CompletionOutcome::SinglePaid(order))
            },
            None => {
                info!("🔄️ Order {id} is no longer pending; dropping redelivered completion event");
                Ok(CompletionOutcome::AlreadyProcessed)
            },
        }
    }

    async fn settle_multi_order(
        &self,
        id: OrderId,
        snapshot: &CheckoutSnapshot,
    ) -> Result<CompletionOutcome, OrderFlowError> {
        // The webhook payload has no line items; fetch the expanded session from the gateway.
        let session_items = self.gateway.fetch_session_items(&snapshot.session_id).await?;
        let report = reconciler::reconcile_line_items(&self.catalog, &session_items).await?;
        if report.is_empty() {
            error!(
                "🧾️ Reconciliation for order {id} produced zero usable line items ({} skipped). Abandoning this \
                 event; the order is left untouched.",
                report.skipped.len()
            );
            return Ok(CompletionOutcome::AbandonedEmptyReconciliation);
        }
        let settlement = MultiOrderSettlement {
            paid_at: Utc::now(),
            session_id: Some(snapshot.session_id.clone()),
            payment_intent_id: snapshot.payment_intent_id.clone(),
            contact: snapshot.contact.clone(),
            total_amount: report.total_amount,
            currency: snapshot.currency.clone(),
            payment_method: snapshot.payment_method.clone(),
            items: report.items,
        };
        match self.db.settle_multi_order(&id, settlement).await? {
            Some(order) => {
                info!(
                    "🔄️ Multi-item order {} settled with {} items, total {} ({} line items skipped)",
                    order.id,
                    order.items.len(),
                    order.total_amount,
                    report.skipped.len()
                );
                let data = json!({
                    "order_id": order.id.as_str(),
                    "total_amount": order.total_amount.to_string(),
                    "item_count": order.items.len(),
                });
                self.try_notify(&order.customer_email, EmailTemplate::PaymentConfirmation, data).await;
                Ok(CompletionOutcome::MultiSettled(order))
            },
            None => {
                info!("🔄️ Multi-item order {id} is no longer pending; dropping redelivered completion event");
                Ok(CompletionOutcome::AlreadyProcessed)
            },
        }
    }

    /// Safety net: a completion event that matches no stored order is never dropped, because that would silently
    /// lose a paid transaction. A fresh order is created directly in `Paid` from the session snapshot instead,
    /// accepting a small duplicate-order risk if the pending record turns up later.
    async fn synthesize_order(&self, snapshot: &CheckoutSnapshot) -> Result<CompletionOutcome, OrderFlowError> {
        warn!(
            "🔄️ No order matched completed session {}. Synthesizing a new order from the session snapshot.",
            snapshot.session_id
        );
        let license = snapshot.license_type.unwrap_or_default();
        let beat_id = snapshot.beat_id.clone().unwrap_or_else(|| {
            warn!("🔄️ Session {} carries no beat reference in its metadata", snapshot.session_id);
            String::new()
        });
        let customer_email = snapshot.contact.email.clone().unwrap_or_else(|| {
            warn!("🔄️ Session {} carries no customer email", snapshot.session_id);
            String::new()
        });
        let order = NewOrder {
            id: OrderId(snapshot.session_id.clone()),
            customer_email,
            customer_name: snapshot.contact.name.clone(),
            customer_phone: snapshot.contact.phone.clone(),
            total_amount: snapshot.amount_total.unwrap_or_default(),
            currency: snapshot.currency.clone().unwrap_or_else(|| USD_CURRENCY_CODE.to_string()),
            payment_method: snapshot.payment_method.clone(),
            payment_id: Some(snapshot.session_id.clone()),
            payment_intent_id: snapshot.payment_intent_id.clone(),
            license_type: license,
            beat_id,
            status: OrderStatus::Paid,
            paid_at: Some(Utc::now()),
        };
        match self.db.insert_synthesized_order(order).await {
            Ok(order) => {
                info!("🔄️ Synthesized order {} for session {}", order.id, snapshot.session_id);
                let data = json!({
                    "order_id": order.id.as_str(),
                    "total_amount": order.total_amount.to_string(),
                    "license_type": order.license_type.to_string(),
                });
                self.try_notify(&order.customer_email, EmailTemplate::PaymentConfirmation, data).await;
                Ok(CompletionOutcome::Synthesized(order))
            },
            Err(PaymentGatewayError::OrderAlreadyExists(id)) => {
                info!("🔄️ Synthesized order {id} already exists; treating as a redelivery");
                Ok(CompletionOutcome::AlreadyProcessed)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Handle a `session-expired` event: `Pending -> Cancelled`.
    pub async fn process_session_expired(&self, refs: MatchRefs) -> Result<TransitionOutcome, OrderFlowError> {
        let outcome = matcher::resolve_order(&self.db, &refs, false).await?;
        let update = TransitionUpdate::cancelled(Utc::now(), "session expired");
        self.apply_transition(outcome, &[OrderStatus::Pending], update, "session-expired").await
    }

    /// Handle a `payment-failed` event: `Pending -> Failed`, then a best-effort failure email.
    pub async fn process_payment_failed(
        &self,
        failure: PaymentFailureSnapshot,
    ) -> Result<TransitionOutcome, OrderFlowError> {
        let outcome = matcher::resolve_order(&self.db, &failure.match_refs(), true).await?;
        let update = TransitionUpdate::failed(Utc::now(), failure.failure_code.clone(), failure.failure_reason.clone());
        let outcome = self.apply_transition(outcome, &[OrderStatus::Pending], update, "payment-failed").await?;
        if let Some((email, order_id)) = transition_recipient(&outcome) {
            let data = json!({ "order_id": order_id.as_str(), "failure_code": failure.failure_code });
            self.try_notify(&email, EmailTemplate::PaymentFailed, data).await;
        }
        Ok(outcome)
    }

    /// Handle a `dispute-created` event: `Paid -> Disputed`, then a best-effort dispute email.
    pub async fn process_dispute_created(
        &self,
        dispute: DisputeSnapshot,
    ) -> Result<TransitionOutcome, OrderFlowError> {
        let outcome = matcher::resolve_order(&self.db, &dispute.match_refs(), true).await?;
        let update = TransitionUpdate::disputed(Utc::now(), dispute.dispute_id.clone(), dispute.reason.clone());
        let outcome = self.apply_transition(outcome, &[OrderStatus::Paid], update, "dispute-created").await?;
        if let Some((email, order_id)) = transition_recipient(&outcome) {
            let data = json!({ "order_id": order_id.as_str(), "dispute_id": dispute.dispute_id });
            self.try_notify(&email, EmailTemplate::DisputeOpened, data).await;
        }
        Ok(outcome)
    }

    /// Handle a `charge-refunded` event: `Paid|Disputed -> Refunded`, then a best-effort refund email.
    ///
    /// Only the first record in the gateway's refund list is applied; partial refunds are not summed.
    pub async fn process_charge_refunded(&self, refund: RefundSnapshot) -> Result<TransitionOutcome, OrderFlowError> {
        let outcome = matcher::resolve_order(&self.db, &refund.match_refs(), true).await?;
        let (refund_id, refund_amount) = match refund.refunds.first() {
            Some(record) => (Some(record.id.clone()), Some(record.amount)),
            None => {
                warn!("🔄️ Refund event arrived with an empty refund list");
                (None, None)
            },
        };
        let update = TransitionUpdate::refunded(Utc::now(), refund_id, refund_amount);
        let outcome = self
            .apply_transition(outcome, &[OrderStatus::Paid, OrderStatus::Disputed], update, "charge-refunded")
            .await?;
        if let Some((email, order_id)) = transition_recipient(&outcome) {
            let amount = refund_amount.map(|a| a.to_string());
            let data = json!({ "order_id": order_id.as_str(), "refund_amount": amount });
            self.try_notify(&email, EmailTemplate::RefundProcessed, data).await;
        }
        Ok(outcome)
    }

    async fn apply_transition(
        &self,
        outcome: MatchOutcome,
        expected: &[OrderStatus],
        update: TransitionUpdate,
        context: &str,
    ) -> Result<TransitionOutcome, OrderFlowError> {
        match outcome {
            MatchOutcome::Multi(order) => match self.db.update_multi_order_status(&order.id, expected, update).await? {
                Some(updated) => {
                    info!("🔄️ {context}: multi-item order {} is now {}", updated.id, updated.status);
                    Ok(TransitionOutcome::Multi(updated))
                },
                None => {
                    info!(
                        "🔄️ {context}: multi-item order {} is {} and cannot transition; dropping stale event",
                        order.id, order.status
                    );
                    Ok(TransitionOutcome::Stale)
                },
            },
            MatchOutcome::Single(order) => match self.db.update_order_status(&order.id, expected, update).await? {
                Some(updated) => {
                    info!("🔄️ {context}: order {} is now {}", updated.id, updated.status);
                    Ok(TransitionOutcome::Single(updated))
                },
                None => {
                    info!(
                        "🔄️ {context}: order {} is {} and cannot transition; dropping stale event",
                        order.id, order.status
                    );
                    Ok(TransitionOutcome::Stale)
                },
            },
            MatchOutcome::Unmatched => {
                warn!("🔄️ {context}: no matching order for this event; dropping it");
                Ok(TransitionOutcome::Unmatched)
            },
        }
    }

    /// Best-effort notification send. Failures are logged and absorbed; they never propagate and never roll back
    /// the already-committed order mutation.
    async fn try_notify(&self, recipient: &str, template: EmailTemplate, data: serde_json::Value) {
        if recipient.is_empty() {
            warn!("✉️ No recipient for {template} notification; skipping send");
            return;
        }
        if let Err(e) = self.notifier.send(recipient, template, data).await {
            error!("✉️ Could not send {template} notification to {recipient}. {e}");
        }
    }
}

fn transition_recipient(outcome: &TransitionOutcome) -> Option<(String, OrderId)> {
    match outcome {
        TransitionOutcome::Single(order) => Some((order.customer_email.clone(), order.id.clone())),
        TransitionOutcome::Multi(order) => Some((order.customer_email.clone(), order.id.clone())),
        TransitionOutcome::Stale | TransitionOutcome::Unmatched => None,
    }
}

#[cfg(test)]
mod test {
    use bpg_common::Money;

    use super::*;
    use crate::{
        db_types::{LicenseType, OrderItem},
        order_flow::objects::{ItemSnapshot, ProductSnapshot, RefundRecord, SessionItems},
        test_utils::{make_beat, make_multi_order, make_order, MockCatalog, MockDb, MockGateway, MockNotifier},
        traits::ContactUpdate,
    };

    fn snapshot(session_id: &str) -> CheckoutSnapshot {
        CheckoutSnapshot {
            session_id: session_id.to_string(),
            payment_intent_id: Some("pi_1".to_string()),
            order_ref: None,
            contact: ContactUpdate {
                email: Some("customer@example.com".to_string()),
                name: Some("Kai Customer".to_string()),
                phone: None,
            },
            amount_total: Some(Money::from_cents(4999)),
            currency: Some("USD".to_string()),
            payment_method: Some("card".to_string()),
            beat_id: Some("beat-1".to_string()),
            license_type: Some(LicenseType::Premium),
        }
    }

    fn confirming_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|recipient, template, _| {
                recipient == "customer@example.com" && *template == EmailTemplate::PaymentConfirmation
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        notifier
    }

    #[tokio::test]
    async fn completed_session_pays_pending_order_and_freezes_rights() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_session_id().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_id()
            .withf(|sid| sid == "cs_1")
            .returning(|_| Ok(Some(make_order("ord-1"))));
        db.expect_mark_order_paid()
            .withf(|id, update| {
                id.as_str() == "ord-1" &&
                    update.license_type == Some(LicenseType::Premium) &&
                    update.usage_rights.contains(&"track_stems".to_string()) &&
                    update.payment_id.as_deref() == Some("cs_1")
            })
            .times(1)
            .returning(|id, update| {
                let mut order = make_order(id.as_str());
                order.status = OrderStatus::Paid;
                order.paid_at = Some(update.paid_at);
                order.license_type = LicenseType::Premium;
                Ok(Some(order))
            });
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), confirming_notifier());
        let outcome = api.process_session_completed(snapshot("cs_1")).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::SinglePaid(o) if o.status == OrderStatus::Paid));
    }

    #[tokio::test]
    async fn multi_item_completion_reconciles_and_settles() {
        let mut snap = snapshot("cs_2");
        snap.order_ref = Some(OrderId("mo-1".to_string()));

        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_id()
            .withf(|id| id.as_str() == "mo-1")
            .returning(|id| Ok(Some(make_multi_order(id.as_str()))));
        db.expect_settle_multi_order()
            .withf(|id, settlement| {
                // The deleted product must be filtered out and the total recomputed from the survivor.
                id.as_str() == "mo-1" &&
                    settlement.items.len() == 1 &&
                    settlement.total_amount == Money::from_cents(2 * 2999)
            })
            .times(1)
            .returning(|id, settlement| {
                let mut order = make_multi_order(id.as_str());
                order.status = OrderStatus::Paid;
                order.total_amount = settlement.total_amount;
                order.items = settlement
                    .items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| OrderItem {
                        id: i as i64 + 1,
                        order_id: order.id.clone(),
                        beat_id: item.beat_id.clone(),
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        total_price: item.total_price,
                        license_type: item.license_type,
                    })
                    .collect();
                Ok(Some(order))
            });

        let mut gateway = MockGateway::new();
        gateway.expect_fetch_session_items().withf(|sid| sid == "cs_2").returning(|_| {
            Ok(SessionItems {
                items: vec![
                    ItemSnapshot {
                        price_id: "price_1".to_string(),
                        quantity: 2,
                        unit_amount: Some(Money::from_cents(2999)),
                        product: Some(ProductSnapshot {
                            id: "prod_1".to_string(),
                            deleted: false,
                            beat_id: Some("beat-1".to_string()),
                        }),
                    },
                    ItemSnapshot {
                        price_id: "price_2".to_string(),
                        quantity: 1,
                        unit_amount: Some(Money::from_cents(4999)),
                        product: Some(ProductSnapshot {
                            id: "prod_2".to_string(),
                            deleted: true,
                            beat_id: Some("beat-2".to_string()),
                        }),
                    },
                ],
                license_map: vec![],
            })
        });

        let mut catalog = MockCatalog::new();
        catalog.expect_fetch_beat().returning(|id| Ok((id == "beat-1").then(|| make_beat(id))));

        let api = OrderFlowApi::new(db, catalog, gateway, confirming_notifier());
        let outcome = api.process_session_completed(snap).await.unwrap();
        match outcome {
            CompletionOutcome::MultiSettled(order) => {
                assert_eq!(order.items.len(), 1);
                assert_eq!(order.total_amount, order.items_total());
            },
            other => panic!("expected MultiSettled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_reconciliation_abandons_without_writing() {
        let mut snap = snapshot("cs_3");
        snap.order_ref = Some(OrderId("mo-2".to_string()));

        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_id().returning(|id| Ok(Some(make_multi_order(id.as_str()))));
        // No settle expectation: the settle call itself would fail the test.
        let mut gateway = MockGateway::new();
        gateway.expect_fetch_session_items().returning(|_| {
            Ok(SessionItems {
                items: vec![ItemSnapshot {
                    price_id: "price_1".to_string(),
                    quantity: 1,
                    unit_amount: Some(Money::from_cents(2999)),
                    product: Some(ProductSnapshot {
                        id: "prod_1".to_string(),
                        deleted: true,
                        beat_id: Some("beat-1".to_string()),
                    }),
                }],
                license_map: vec![],
            })
        });
        let api = OrderFlowApi::new(db, MockCatalog::new(), gateway, MockNotifier::new());
        let outcome = api.process_session_completed(snap).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::AbandonedEmptyReconciliation));
    }

    #[tokio::test]
    async fn redelivered_completion_after_refund_is_dropped() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_session_id().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_id().returning(|_| {
            let mut order = make_order("ord-1");
            order.status = OrderStatus::Refunded;
            Ok(Some(order))
        });
        // The compare-and-swap guard fails, so the store returns nothing and no email goes out.
        db.expect_mark_order_paid().returning(|_, _| Ok(None));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), MockNotifier::new());
        let outcome = api.process_session_completed(snapshot("cs_1")).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::AlreadyProcessed));
    }

    #[tokio::test]
    async fn unmatched_completion_synthesizes_a_paid_order() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_session_id().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_id().returning(|_| Ok(None));
        db.expect_insert_synthesized_order()
            .withf(|order| {
                order.id.as_str() == "cs_77" &&
                    order.status == OrderStatus::Paid &&
                    order.paid_at.is_some() &&
                    order.payment_id.as_deref() == Some("cs_77")
            })
            .times(1)
            .returning(|new_order| {
                let mut order = make_order(new_order.id.as_str());
                order.status = new_order.status;
                order.paid_at = new_order.paid_at;
                Ok(order)
            });
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), confirming_notifier());
        let outcome = api.process_session_completed(snapshot("cs_77")).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::Synthesized(_)));
    }

    #[tokio::test]
    async fn synthesized_order_collision_counts_as_redelivery() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_session_id().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_id().returning(|_| Ok(None));
        db.expect_insert_synthesized_order()
            .returning(|order| Err(PaymentGatewayError::OrderAlreadyExists(order.id)));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), MockNotifier::new());
        let outcome = api.process_session_completed(snapshot("cs_77")).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::AlreadyProcessed));
    }

    #[tokio::test]
    async fn expired_session_cancels_pending_order() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_session_id().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_id().returning(|_| Ok(Some(make_order("ord-4"))));
        db.expect_update_order_status()
            .withf(|id, expected, update| {
                id.as_str() == "ord-4" &&
                    expected == [OrderStatus::Pending] &&
                    update.new_status == OrderStatus::Cancelled &&
                    update.cancel_reason.as_deref() == Some("session expired")
            })
            .times(1)
            .returning(|id, _, update| {
                let mut order = make_order(id.as_str());
                order.status = update.new_status;
                order.cancelled_at = Some(update.timestamp);
                order.cancel_reason = update.cancel_reason;
                Ok(Some(order))
            });
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), MockNotifier::new());
        let refs = MatchRefs { session_id: Some("cs_4".to_string()), ..Default::default() };
        let outcome = api.process_session_expired(refs).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Single(o) if o.status == OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn payment_failure_survives_a_broken_mailer() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_payment_intent().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_intent()
            .withf(|pi| pi == "pi_5")
            .returning(|_| Ok(Some(make_order("ord-5"))));
        db.expect_update_order_status()
            .withf(|_, expected, update| {
                expected == [OrderStatus::Pending] &&
                    update.new_status == OrderStatus::Failed &&
                    update.failure_code.as_deref() == Some("card_declined")
            })
            .returning(|id, _, update| {
                let mut order = make_order(id.as_str());
                order.status = update.new_status;
                order.failed_at = Some(update.timestamp);
                order.failure_code = update.failure_code;
                Ok(Some(order))
            });
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|_, template, _| *template == EmailTemplate::PaymentFailed)
            .times(1)
            .returning(|_, _, _| Err(crate::traits::NotificationError::SendFailure("smtp down".to_string())));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), notifier);
        let failure = PaymentFailureSnapshot {
            payment_intent_id: Some("pi_5".to_string()),
            failure_code: Some("card_declined".to_string()),
            failure_reason: Some("Your card was declined.".to_string()),
            ..Default::default()
        };
        // The send error is absorbed; the transition still reports success.
        let outcome = api.process_payment_failed(failure).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Single(o) if o.status == OrderStatus::Failed));
    }

    #[tokio::test]
    async fn dispute_moves_paid_order_to_disputed() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_payment_intent().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_intent().returning(|_| {
            let mut order = make_order("ord-6");
            order.status = OrderStatus::Paid;
            Ok(Some(order))
        });
        db.expect_update_order_status()
            .withf(|_, expected, update| {
                expected == [OrderStatus::Paid] &&
                    update.new_status == OrderStatus::Disputed &&
                    update.dispute_id.as_deref() == Some("dp_1")
            })
            .returning(|id, _, update| {
                let mut order = make_order(id.as_str());
                order.status = update.new_status;
                order.disputed_at = Some(update.timestamp);
                order.dispute_id = update.dispute_id;
                Ok(Some(order))
            });
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|_, template, data| {
                *template == EmailTemplate::DisputeOpened && data["dispute_id"] == "dp_1"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), notifier);
        let dispute = DisputeSnapshot {
            dispute_id: "dp_1".to_string(),
            payment_intent_id: Some("pi_6".to_string()),
            order_ref: None,
            reason: Some("fraudulent".to_string()),
        };
        let outcome = api.process_dispute_created(dispute).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Single(o) if o.status == OrderStatus::Disputed));
    }

    #[tokio::test]
    async fn refund_applies_the_first_record_only() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_payment_intent().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_intent().returning(|_| {
            let mut order = make_order("ord-7");
            order.status = OrderStatus::Disputed;
            Ok(Some(order))
        });
        db.expect_update_order_status()
            .withf(|_, expected, update| {
                expected == [OrderStatus::Paid, OrderStatus::Disputed] &&
                    update.new_status == OrderStatus::Refunded &&
                    update.refund_id.as_deref() == Some("re_1") &&
                    update.refund_amount == Some(Money::from_cents(1000))
            })
            .times(1)
            .returning(|id, _, update| {
                let mut order = make_order(id.as_str());
                order.status = update.new_status;
                order.refunded_at = Some(update.timestamp);
                order.refund_id = update.refund_id;
                order.refund_amount = update.refund_amount;
                Ok(Some(order))
            });
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|_, template, _| *template == EmailTemplate::RefundProcessed)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), notifier);
        let refund = RefundSnapshot {
            payment_intent_id: Some("pi_7".to_string()),
            order_ref: None,
            refunds: vec![
                RefundRecord { id: "re_1".to_string(), amount: Money::from_cents(1000) },
                RefundRecord { id: "re_2".to_string(), amount: Money::from_cents(2500) },
            ],
        };
        let outcome = api.process_charge_refunded(refund).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Single(o) if o.status == OrderStatus::Refunded));
    }

    #[tokio::test]
    async fn stale_dispute_on_refunded_order_is_dropped() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_payment_intent().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_intent().returning(|_| {
            let mut order = make_order("ord-8");
            order.status = OrderStatus::Refunded;
            Ok(Some(order))
        });
        db.expect_update_order_status().returning(|_, _, _| Ok(None));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), MockNotifier::new());
        let dispute = DisputeSnapshot {
            dispute_id: "dp_9".to_string(),
            payment_intent_id: Some("pi_8".to_string()),
            order_ref: None,
            reason: None,
        };
        let outcome = api.process_dispute_created(dispute).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Stale));
    }

    #[tokio::test]
    async fn unmatched_failure_event_is_dropped() {
        let mut db = MockDb::new();
        db.expect_fetch_multi_order_by_payment_intent().returning(|_| Ok(None));
        db.expect_fetch_order_by_payment_intent().returning(|_| Ok(None));
        let api = OrderFlowApi::new(db, MockCatalog::new(), MockGateway::new(), MockNotifier::new());
        let failure =
            PaymentFailureSnapshot { payment_intent_id: Some("pi_x".to_string()), ..Default::default() };
        let outcome = api.process_payment_failed(failure).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Unmatched));
    }
}
