//----------------------------------------------   Webhook routes  ----------------------------------------------------

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use beat_payment_engine::{
    order_flow::objects::{CompletionOutcome, TransitionOutcome},
    traits::{CatalogReader, GatewayClient, NotificationService, PaymentGatewayDatabase},
    OrderFlowApi,
};
use log::*;
use stripe_tools::{construct_event, EventPayload, WebhookError, SIGNATURE_HEADER};

use crate::{config::ServerConfig, data_objects::WebhookAck, errors::ServerError, integrations::stripe};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// The gateway webhook endpoint.
///
/// The raw body bytes are verified against the signature header before anything parses them; an unverifiable
/// delivery gets a 400 and touches nothing. Once verified and routed, the response is always 200 with
/// `{"received": true}`. Handler-level problems (store outages, unmatched events) are logged, and the order is left
/// for the gateway's redelivery or manual intervention, because a non-2xx would make the gateway hammer the
/// endpoint with an event we already know how we want to treat.
pub async fn stripe_webhook<B, C, G, N>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B, C, G, N>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    C: CatalogReader,
    G: GatewayClient,
    N: NotificationService,
{
    trace!("🛍️️ Received webhook request: {}", req.uri());
    let sig_header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| WebhookError::MalformedHeader(format!("missing {SIGNATURE_HEADER} header")))?;
    let event = construct_event(&body, sig_header, config.stripe.webhook_secret.reveal())?;
    debug!("🛍️️ Verified webhook delivery {} ({})", event.id, event.event_type);
    dispatch_event(event.payload, api.get_ref()).await;
    Ok(HttpResponse::Ok().json(WebhookAck::ok()))
}

async fn dispatch_event<B, C, G, N>(payload: EventPayload, api: &OrderFlowApi<B, C, G, N>)
where
    B: PaymentGatewayDatabase,
    C: CatalogReader,
    G: GatewayClient,
    N: NotificationService,
{
    match payload {
        EventPayload::SessionCompleted(session) => {
            let snapshot = stripe::checkout_snapshot(&session);
            match api.process_session_completed(snapshot).await {
                Ok(CompletionOutcome::SinglePaid(order)) => info!("🛍️️ Order {} paid", order.id),
                Ok(CompletionOutcome::MultiSettled(order)) => {
                    info!("🛍️️ Multi-item order {} settled with {} items", order.id, order.items.len())
                },
                Ok(CompletionOutcome::Synthesized(order)) => info!("🛍️️ Order {} synthesized", order.id),
                Ok(CompletionOutcome::AlreadyProcessed) => {
                    info!("🛍️️ Completion for session {} already processed", session.id)
                },
                Ok(CompletionOutcome::AbandonedEmptyReconciliation) => {
                    error!("🛍️️ Completion for session {} abandoned: no usable line items", session.id)
                },
                Err(e) => error!("🛍️️ Could not process completion for session {}. {e}", session.id),
            }
        },
        EventPayload::SessionExpired(session) => {
            let refs = stripe::checkout_snapshot(&session).match_refs();
            match api.process_session_expired(refs).await {
                Ok(outcome) => log_transition("expiry", &session.id, &outcome),
                Err(e) => error!("🛍️️ Could not process expiry for session {}. {e}", session.id),
            }
        },
        // The completion event carries everything this flow needs; the succeeded intent adds nothing.
        EventPayload::PaymentSucceeded(intent) => {
            debug!("🛍️️ Ignoring payment_intent.succeeded for {}", intent.id)
        },
        EventPayload::PaymentFailed(intent) => {
            let failure = stripe::failure_snapshot(&intent);
            match api.process_payment_failed(failure).await {
                Ok(outcome) => log_transition("payment failure", &intent.id, &outcome),
                Err(e) => error!("🛍️️ Could not process payment failure for {}. {e}", intent.id),
            }
        },
        EventPayload::DisputeCreated(dispute) => {
            let snapshot = stripe::dispute_snapshot(&dispute);
            match api.process_dispute_created(snapshot).await {
                Ok(outcome) => log_transition("dispute", &dispute.id, &outcome),
                Err(e) => error!("🛍️️ Could not process dispute {}. {e}", dispute.id),
            }
        },
        EventPayload::ChargeRefunded(charge) => {
            let snapshot = stripe::refund_snapshot(&charge);
            match api.process_charge_refunded(snapshot).await {
                Ok(outcome) => log_transition("refund", &charge.id, &outcome),
                Err(e) => error!("🛍️️ Could not process refund on charge {}. {e}", charge.id),
            }
        },
        EventPayload::Unhandled { kind } => {
            debug!("🛍️️ Acknowledging unhandled event kind {kind}");
        },
    }
}

fn log_transition(context: &str, source_id: &str, outcome: &TransitionOutcome) {
    match outcome {
        TransitionOutcome::Single(order) => info!("🛍️️ {context} for {source_id}: order {} is now {}", order.id, order.status),
        TransitionOutcome::Multi(order) => {
            info!("🛍️️ {context} for {source_id}: multi-item order {} is now {}", order.id, order.status)
        },
        TransitionOutcome::Stale => info!("🛍️️ {context} for {source_id}: stale event dropped"),
        TransitionOutcome::Unmatched => warn!("🛍️️ {context} for {source_id}: no matching order"),
    }
}
