//! # API REST
//!
//! REST API for the LIMS workflow core.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - actor extraction from gateway headers
//! - mapping of workflow errors onto status codes and a JSON error envelope
//!
//! All lifecycle rules live in `lims-core`; this crate only adapts them to HTTP.

#![warn(rust_2018_idioms)]

pub mod actor;
pub mod config;
pub mod error;
pub mod handlers;
pub mod renderer;

use axum::routing::{get, post, put};
use axum::Router;
use lims_core::{InMemoryCatalog, InMemoryStore, LabService};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::RestConfig;
pub use renderer::FileRenderer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: LabService<InMemoryStore>,
}

impl AppState {
    pub fn new(service: LabService<InMemoryStore>) -> Self {
        Self { service }
    }
}

/// Builds the state the server binaries run with: an empty in-memory store and catalog,
/// and reports written under the configured directory.
pub fn build_state(cfg: &RestConfig) -> AppState {
    let service = LabService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCatalog::new()),
        Arc::new(FileRenderer::new(cfg.report_dir.clone())),
        Arc::new(cfg.core.clone()),
    );
    AppState::new(service)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::register_patient,
        handlers::list_patients,
        handlers::get_patient,
        handlers::patient_orders,
        handlers::create_order,
        handlers::get_order,
        handlers::cancel_order,
        handlers::edit_tests,
        handlers::report_status,
        handlers::generate_report,
        handlers::get_report,
        handlers::create_sample,
        handlers::list_samples,
        handlers::get_sample,
        handlers::collect_sample,
        handlers::receive_sample,
        handlers::reject_sample,
        handlers::create_result,
        handlers::list_results,
        handlers::get_result,
        handlers::enter_result,
        handlers::verify_result,
        handlers::publish_result,
        handlers::reject_result,
        handlers::get_workflow_settings,
        handlers::update_workflow_settings,
        handlers::list_permissions,
        handlers::set_permission,
        handlers::reset_permission,
        handlers::check_permission,
        handlers::list_tests,
        handlers::create_test,
        handlers::update_test,
    ),
    components(schemas(
        handlers::HealthRes,
        handlers::ReasonReq,
        handlers::ReportStatusRes,
        handlers::AllowedRes,
        error::ErrorBody,
        error::ErrorDetail,
        lims_core::Patient,
        lims_core::NewPatient,
        lims_core::Sex,
        lims_core::Order,
        lims_core::OrderItem,
        lims_core::OrderView,
        lims_core::order::OrderItemView,
        lims_core::OrderStatus,
        lims_core::OrderPriority,
        lims_core::NewOrder,
        lims_core::TestEdit,
        lims_core::Sample,
        lims_core::SampleStatus,
        lims_core::LabResult,
        lims_core::ResultStatus,
        lims_core::ResultEntry,
        lims_core::Report,
        lims_core::ReportOutcome,
        lims_core::WorkflowSettings,
        lims_core::WorkflowSettingsUpdate,
        lims_core::Role,
        lims_core::ActionKind,
        lims_core::Capabilities,
        lims_core::EffectivePermission,
        lims_core::permissions::CapabilitySource,
        lims_core::TestDefinition,
        lims_core::TestDefinitionInput,
    ))
)]
pub struct ApiDoc;

/// Routes of the REST API, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health))
        .route("/patients", get(list_patients).post(register_patient))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id/orders", get(patient_orders))
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/edit-tests", post(edit_tests))
        .route("/orders/:id/report-status", get(report_status))
        .route("/orders/:id/report", get(get_report).post(generate_report))
        .route("/order-items/:id/sample", post(create_sample))
        .route("/order-items/:id/result", post(create_result))
        .route("/samples", get(list_samples))
        .route("/samples/:id", get(get_sample))
        .route("/samples/:id/collect", post(collect_sample))
        .route("/samples/:id/receive", post(receive_sample))
        .route("/samples/:id/reject", post(reject_sample))
        .route("/results", get(list_results))
        .route("/results/:id", get(get_result))
        .route("/results/:id/enter", post(enter_result))
        .route("/results/:id/verify", post(verify_result))
        .route("/results/:id/publish", post(publish_result))
        .route("/results/:id/reject", post(reject_result))
        .route(
            "/settings/workflow",
            get(get_workflow_settings).put(update_workflow_settings),
        )
        .route("/permissions", get(list_permissions))
        .route("/permissions/check", get(check_permission))
        .route(
            "/permissions/:role",
            put(set_permission).delete(reset_permission),
        )
        .route("/tests", get(list_tests).post(create_test))
        .route("/tests/:id", put(update_test))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
