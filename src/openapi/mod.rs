use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Canteen API",
        version = "0.3.0",
        description = r#"
# Canteen Ordering & Payment Reconciliation API

Order processing backend for a school-cafeteria ordering platform.
Guardians and staff submit weekly lunch/snack selections, pay through an
external payment provider, and this API keeps order and payment state
consistent across asynchronous provider callbacks, user returns from the
hosted checkout page, and manual reconciliation.

## Error Handling

Errors use a consistent response format with appropriate status codes:

```json
{
  "error": "Conflict",
  "message": "Selection would be paid twice: 2024-09-02, child Anna: lunch already paid as Spaghetti",
  "conflicts": [ ... ],
  "timestamp": "2024-09-02T10:30:00Z"
}
```

Duplicate-slot rejections (409) carry the conflicting slots in
`conflicts`. Gateway failures (502) are safe to retry: the order stays
pending and a retried checkout reuses it.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::payment_return::payment_return,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::current_order,
        crate::handlers::orders::amend_order,
        crate::handlers::orders::confirm_payment,
        crate::handlers::orders::reset_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::health::health,
    ),
    components(schemas(
        crate::models::Order,
        crate::models::OrderStatus,
        crate::models::UserRole,
        crate::models::MealCategory,
        crate::models::MenuItem,
        crate::models::DaySelection,
        crate::models::SlotOwner,
        crate::models::SlotConflict,
        crate::services::selections::RawMenuItem,
        crate::services::selections::RawDaySelection,
        crate::services::reconciliation::CheckoutRequest,
        crate::services::reconciliation::CheckoutResponse,
        crate::services::reconciliation::ReturnOutcome,
        crate::services::reconciliation::PaymentReturnView,
        crate::handlers::orders::AmendOrderRequest,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "Checkout", description = "Weekly selection checkout"),
        (name = "Payments", description = "Provider callbacks and reconciliation"),
        (name = "Orders", description = "Order reads, amendment and admin overrides"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;
