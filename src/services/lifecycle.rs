//! The order lifecycle state machine.
//!
//! Every status mutation in the system (gateway webhooks, user-triggered
//! manual reconciliation, admin overrides) goes through [`apply`], so
//! status and the paired timestamps always change together and the
//! webhook-driven and manually-triggered paths cannot diverge.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::errors::ServiceError;
use crate::models::{Order, OrderStatus};
use crate::store::OrderPatch;

/// External occurrences the state machine reacts to.
#[derive(Clone, Debug)]
pub enum LifecycleEvent {
    /// A gateway intent was created for the order.
    PaymentStarted { transaction_ref: Option<String> },
    /// The gateway reported a successful payment (webhook or manual
    /// reconciliation; both arrive here identically).
    GatewayApproved { transaction_ref: Option<String> },
    /// The gateway reported a decline/failure/abandonment.
    GatewayDeclined { transaction_ref: Option<String> },
    /// The gateway reported the payment as still in flight.
    GatewayPending { raw_status: String },
    /// The gateway reported something this system does not recognize.
    GatewayUnknown {
        raw_status: String,
        payload: serde_json::Value,
    },
    /// Administrative override: reopen the order for editing/repayment.
    AdminReset,
    /// Administrative override: cancel the order.
    AdminCancel,
}

/// Outcome of applying an event to an order snapshot.
#[derive(Clone, Debug)]
pub enum Transition {
    /// Nothing to do (idempotent replay, or an in-flight outcome).
    NoOp,
    /// No status change, but the raw outcome is recorded for audit.
    Audit(OrderPatch),
    /// A real transition with the patch that performs it.
    Apply {
        from: OrderStatus,
        to: OrderStatus,
        patch: OrderPatch,
    },
}

/// Applies `event` to the order snapshot, yielding the patch to persist.
///
/// Patches carry the snapshot's version as `expected_version`, so a
/// concurrent writer turns into a `ConcurrentModification` at the store
/// instead of a silent lost update.
pub fn apply(
    order: &Order,
    event: &LifecycleEvent,
    now: DateTime<Utc>,
) -> Result<Transition, ServiceError> {
    match event {
        LifecycleEvent::PaymentStarted { transaction_ref } => match order.status {
            OrderStatus::Pending => Ok(transition(
                order,
                OrderStatus::ProcessingPayment,
                OrderPatch {
                    payment_transaction_id: transaction_ref.clone().map(Some),
                    ..base_patch(order, OrderStatus::ProcessingPayment)
                },
            )),
            OrderStatus::ProcessingPayment => Ok(Transition::NoOp),
            OrderStatus::Paid | OrderStatus::Cancelled => Err(ServiceError::InvalidOperation(
                format!("cannot start payment for a {} order", order.status),
            )),
        },

        LifecycleEvent::GatewayApproved { transaction_ref } => match order.status {
            // A success callback may overtake the intent-created write;
            // the signed callback is proof the intent existed.
            OrderStatus::ProcessingPayment | OrderStatus::Pending => Ok(transition(
                order,
                OrderStatus::Paid,
                OrderPatch {
                    paid_at: Some(Some(now)),
                    cancelled_at: Some(None),
                    payment_transaction_id: transaction_ref.clone().map(Some),
                    ..base_patch(order, OrderStatus::Paid)
                },
            )),
            OrderStatus::Paid => Ok(Transition::NoOp),
            OrderStatus::Cancelled => Ok(audit(order, "approved", None, now)),
        },

        LifecycleEvent::GatewayDeclined { transaction_ref } => match order.status {
            OrderStatus::ProcessingPayment | OrderStatus::Pending => Ok(transition(
                order,
                OrderStatus::Cancelled,
                OrderPatch {
                    cancelled_at: Some(Some(now)),
                    paid_at: Some(None),
                    payment_transaction_id: transaction_ref.clone().map(Some),
                    ..base_patch(order, OrderStatus::Cancelled)
                },
            )),
            OrderStatus::Cancelled => Ok(Transition::NoOp),
            OrderStatus::Paid => Ok(audit(order, "declined", None, now)),
        },

        LifecycleEvent::GatewayPending { .. } => Ok(Transition::NoOp),

        LifecycleEvent::GatewayUnknown {
            raw_status,
            payload,
        } => Ok(audit(order, raw_status, Some(payload.clone()), now)),

        LifecycleEvent::AdminReset => match order.status {
            OrderStatus::ProcessingPayment => Err(ServiceError::InvalidOperation(
                "cannot reset an order awaiting its payment outcome".to_string(),
            )),
            OrderStatus::Pending
                if order.paid_at.is_none() && order.cancelled_at.is_none() =>
            {
                Ok(Transition::NoOp)
            }
            _ => Ok(transition(
                order,
                OrderStatus::Pending,
                OrderPatch {
                    paid_at: Some(None),
                    cancelled_at: Some(None),
                    ..base_patch(order, OrderStatus::Pending)
                },
            )),
        },

        LifecycleEvent::AdminCancel => match order.status {
            OrderStatus::Cancelled => Ok(Transition::NoOp),
            _ => Ok(transition(
                order,
                OrderStatus::Cancelled,
                OrderPatch {
                    cancelled_at: Some(Some(now)),
                    paid_at: Some(None),
                    ..base_patch(order, OrderStatus::Cancelled)
                },
            )),
        },
    }
}

fn base_patch(order: &Order, to: OrderStatus) -> OrderPatch {
    OrderPatch {
        status: Some(to),
        expected_version: Some(order.version),
        ..OrderPatch::default()
    }
}

fn transition(order: &Order, to: OrderStatus, patch: OrderPatch) -> Transition {
    Transition::Apply {
        from: order.status,
        to,
        patch,
    }
}

/// Unrecognized or conflicting outcomes never mutate status; they land in
/// the audit metadata so an operator can investigate.
fn audit(
    order: &Order,
    raw_status: &str,
    payload: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Transition {
    Transition::Audit(OrderPatch {
        gateway_metadata: Some(json!({
            "last_unapplied_outcome": raw_status,
            "order_status_at_receipt": order.status,
            "payload": payload,
            "received_at": now.to_rfc3339(),
        })),
        expected_version: Some(order.version),
        ..OrderPatch::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use assert_matches::assert_matches;
    use test_case::test_case;
    use uuid::Uuid;

    fn order_in(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-TEST".to_string(),
            user_id: Uuid::new_v4(),
            user_role: UserRole::Guardian,
            week_start: chrono::NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
            selections: vec![],
            total: 4500,
            currency: "EUR".to_string(),
            status,
            payment_transaction_id: None,
            gateway_metadata: None,
            legacy_description: None,
            created_at: now,
            updated_at: None,
            paid_at: (status == OrderStatus::Paid).then_some(now),
            cancelled_at: (status == OrderStatus::Cancelled).then_some(now),
            version: 3,
        }
    }

    fn apply_to(status: OrderStatus, event: LifecycleEvent) -> Transition {
        apply(&order_in(status), &event, Utc::now()).unwrap()
    }

    #[test_case(OrderStatus::Pending, OrderStatus::ProcessingPayment; "pending starts payment")]
    fn payment_started_moves_to_processing(from: OrderStatus, to: OrderStatus) {
        let result = apply_to(
            from,
            LifecycleEvent::PaymentStarted {
                transaction_ref: Some("txn-9".to_string()),
            },
        );
        assert_matches!(result, Transition::Apply { from: f, to: t, patch } => {
            assert_eq!((f, t), (from, to));
            assert_eq!(patch.payment_transaction_id, Some(Some("txn-9".to_string())));
            assert_eq!(patch.expected_version, Some(3));
        });
    }

    #[test]
    fn payment_started_is_idempotent_and_rejected_on_terminal_orders() {
        let event = LifecycleEvent::PaymentStarted {
            transaction_ref: None,
        };
        assert_matches!(apply_to(OrderStatus::ProcessingPayment, event.clone()), Transition::NoOp);
        assert_matches!(
            apply(&order_in(OrderStatus::Paid), &event, Utc::now()),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            apply(&order_in(OrderStatus::Cancelled), &event, Utc::now()),
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[test_case(OrderStatus::ProcessingPayment; "from processing")]
    #[test_case(OrderStatus::Pending; "from pending when the callback overtook the intent write")]
    fn approval_sets_paid_and_clears_cancelled(from: OrderStatus) {
        let result = apply_to(
            from,
            LifecycleEvent::GatewayApproved {
                transaction_ref: Some("txn-1".to_string()),
            },
        );
        assert_matches!(result, Transition::Apply { to: OrderStatus::Paid, patch, .. } => {
            assert_matches!(patch.paid_at, Some(Some(_)));
            assert_eq!(patch.cancelled_at, Some(None));
        });
    }

    #[test_case(OrderStatus::ProcessingPayment; "from processing")]
    #[test_case(OrderStatus::Pending; "from pending")]
    fn decline_sets_cancelled_and_clears_paid(from: OrderStatus) {
        let result = apply_to(
            from,
            LifecycleEvent::GatewayDeclined {
                transaction_ref: None,
            },
        );
        assert_matches!(result, Transition::Apply { to: OrderStatus::Cancelled, patch, .. } => {
            assert_matches!(patch.cancelled_at, Some(Some(_)));
            assert_eq!(patch.paid_at, Some(None));
        });
    }

    #[test]
    fn replayed_outcomes_are_noops() {
        assert_matches!(
            apply_to(
                OrderStatus::Paid,
                LifecycleEvent::GatewayApproved {
                    transaction_ref: Some("txn-1".to_string())
                }
            ),
            Transition::NoOp
        );
        assert_matches!(
            apply_to(
                OrderStatus::Cancelled,
                LifecycleEvent::GatewayDeclined {
                    transaction_ref: None
                }
            ),
            Transition::NoOp
        );
    }

    #[test]
    fn conflicting_outcomes_on_terminal_orders_only_audit() {
        let result = apply_to(
            OrderStatus::Paid,
            LifecycleEvent::GatewayDeclined {
                transaction_ref: None,
            },
        );
        assert_matches!(result, Transition::Audit(patch) => {
            assert!(patch.status.is_none());
            let metadata = patch.gateway_metadata.unwrap();
            assert_eq!(metadata["last_unapplied_outcome"], "declined");
        });
    }

    #[test]
    fn unknown_outcomes_audit_without_failing() {
        let result = apply_to(
            OrderStatus::ProcessingPayment,
            LifecycleEvent::GatewayUnknown {
                raw_status: "settlement_review".to_string(),
                payload: serde_json::json!({"status": "settlement_review"}),
            },
        );
        assert_matches!(result, Transition::Audit(patch) => {
            let metadata = patch.gateway_metadata.unwrap();
            assert_eq!(metadata["last_unapplied_outcome"], "settlement_review");
            assert_eq!(metadata["payload"]["status"], "settlement_review");
        });
    }

    #[test]
    fn in_flight_outcomes_change_nothing() {
        assert_matches!(
            apply_to(
                OrderStatus::ProcessingPayment,
                LifecycleEvent::GatewayPending {
                    raw_status: "pending".to_string()
                }
            ),
            Transition::NoOp
        );
    }

    #[test_case(OrderStatus::Paid; "reopens a paid order")]
    #[test_case(OrderStatus::Cancelled; "reopens a cancelled order")]
    fn admin_reset_clears_both_timestamps(from: OrderStatus) {
        let result = apply_to(from, LifecycleEvent::AdminReset);
        assert_matches!(result, Transition::Apply { to: OrderStatus::Pending, patch, .. } => {
            assert_eq!(patch.paid_at, Some(None));
            assert_eq!(patch.cancelled_at, Some(None));
        });
    }

    #[test]
    fn admin_reset_of_processing_is_rejected_and_of_clean_pending_is_noop() {
        assert_matches!(
            apply(
                &order_in(OrderStatus::ProcessingPayment),
                &LifecycleEvent::AdminReset,
                Utc::now()
            ),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(apply_to(OrderStatus::Pending, LifecycleEvent::AdminReset), Transition::NoOp);
    }

    #[test_case(OrderStatus::Pending)]
    #[test_case(OrderStatus::ProcessingPayment)]
    #[test_case(OrderStatus::Paid)]
    fn admin_cancel_reaches_cancelled_from_any_non_cancelled_state(from: OrderStatus) {
        let result = apply_to(from, LifecycleEvent::AdminCancel);
        assert_matches!(result, Transition::Apply { to: OrderStatus::Cancelled, patch, .. } => {
            assert_matches!(patch.cancelled_at, Some(Some(_)));
            assert_eq!(patch.paid_at, Some(None));
        });
    }

    #[test]
    fn admin_cancel_of_cancelled_is_noop() {
        assert_matches!(apply_to(OrderStatus::Cancelled, LifecycleEvent::AdminCancel), Transition::NoOp);
    }

    /// Every transition patch either sets one timestamp and clears the
    /// other, or clears both. The two can never end up set together.
    #[test]
    fn timestamps_are_mutually_exclusive_in_every_patch() {
        let events = [
            LifecycleEvent::GatewayApproved {
                transaction_ref: None,
            },
            LifecycleEvent::GatewayDeclined {
                transaction_ref: None,
            },
            LifecycleEvent::AdminReset,
            LifecycleEvent::AdminCancel,
        ];
        let states = [
            OrderStatus::Pending,
            OrderStatus::ProcessingPayment,
            OrderStatus::Paid,
            OrderStatus::Cancelled,
        ];

        for event in &events {
            for state in states {
                let Ok(Transition::Apply { patch, .. }) =
                    apply(&order_in(state), event, Utc::now())
                else {
                    continue;
                };
                let paid_set = matches!(patch.paid_at, Some(Some(_)));
                let cancelled_set = matches!(patch.cancelled_at, Some(Some(_)));
                assert!(
                    !(paid_set && cancelled_set),
                    "{:?} from {:?} sets both timestamps",
                    event,
                    state
                );
                // Setting one side must explicitly clear the other.
                if paid_set {
                    assert_eq!(patch.cancelled_at, Some(None));
                }
                if cancelled_set {
                    assert_eq!(patch.paid_at, Some(None));
                }
            }
        }
    }
}
