//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, loans, notifications, waitlist};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Loans API",
        version = "1.0.0",
        description = "Device reservation, collection, return and waitlist REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::reserve_device,
        loans::list_loans,
        loans::get_overdue_loans,
        loans::get_loan,
        loans::collect_device,
        loans::return_device,
        loans::cancel_loan,
        // Waitlist
        waitlist::join_waitlist,
        waitlist::get_my_waitlist,
        // Notifications
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
    ),
    components(
        schemas(
            // Loans
            loans::ReserveDeviceRequest,
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::ReservationReceipt,
            // Waitlist
            crate::models::waitlist::WaitlistEntry,
            crate::models::waitlist::JoinWaitlistRequest,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::NotificationKind,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Device loan lifecycle"),
        (name = "waitlist", description = "Device waitlists"),
        (name = "notifications", description = "User notification inbox")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
