//! HTTP handlers.
//!
//! Handlers are thin: they extract the actor and payload, call the [`LabService`] and
//! serialise what comes back. Creation endpoints answer 201, everything else 200.
//!
//! [`LabService`]: lims_core::LabService

use crate::actor::RequestActor;
use crate::error::{ApiError, ErrorBody};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use lims_core::{
    ActionKind, Capabilities, EffectivePermission, LabResult, NewOrder, NewPatient, OrderId,
    OrderItemId, OrderView, Patient, PatientId, Report, ReportOutcome, ResultEntry, ResultId,
    ResultStatus, Role, Sample, SampleId, SampleStatus, TestDefinition, TestDefinitionInput,
    TestEdit, TestId, WorkflowSettings, WorkflowSettingsUpdate,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

fn created<T>(value: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(value)))
}

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ReasonReq {
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReportStatusRes {
    pub can_generate: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AllowedRes {
    pub role: Role,
    pub action: ActionKind,
    pub allowed: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct StatusFilter {
    /// Status to list; defaults to the first state of the lifecycle.
    pub status: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct ActionQuery {
    /// Action name, e.g. `VERIFY_RESULT`.
    pub action: String,
}

// ============================================================================
// HEALTH
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Health check response", body = HealthRes))
)]
/// Health check endpoint for monitoring and load balancers.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: format!("{} LIMS REST API is alive", state.service.config().lab_name()),
    })
}

// ============================================================================
// PATIENTS
// ============================================================================

#[utoipa::path(
    post,
    path = "/patients",
    request_body = NewPatient,
    responses(
        (status = 201, description = "Patient registered", body = Patient),
        (status = 400, description = "Invalid patient data", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn register_patient(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(req): Json<NewPatient>,
) -> Created<Patient> {
    created(state.service.register_patient(&actor, req)?)
}

#[utoipa::path(
    get,
    path = "/patients",
    responses((status = 200, description = "All patients", body = [Patient]))
)]
#[axum::debug_handler]
pub async fn list_patients(State(state): State<AppState>) -> ApiResult<Vec<Patient>> {
    Ok(Json(state.service.patients()?))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = u64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient", body = Patient),
        (status = 404, description = "Unknown patient", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Patient> {
    Ok(Json(state.service.patient(PatientId(id))?))
}

#[utoipa::path(
    get,
    path = "/patients/{id}/orders",
    params(("id" = u64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Orders of the patient, newest first", body = [OrderView]),
        (status = 404, description = "Unknown patient", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn patient_orders(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Vec<OrderView>> {
    Ok(Json(state.service.orders_for_patient(PatientId(id))?))
}

// ============================================================================
// ORDERS
// ============================================================================

#[utoipa::path(
    post,
    path = "/orders",
    request_body = NewOrder,
    responses(
        (status = 201, description = "Order created", body = OrderView),
        (status = 400, description = "Invalid order", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody),
        (status = 404, description = "Unknown patient or test", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(req): Json<NewOrder>,
) -> Created<OrderView> {
    created(state.service.create_order(&actor, req)?)
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = u64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with computed status", body = OrderView),
        (status = 404, description = "Unknown order", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_order(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<OrderView> {
    Ok(Json(state.service.order_view(OrderId(id))?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = u64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled", body = OrderView),
        (status = 400, description = "Order already cancelled or progressed", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> ApiResult<OrderView> {
    Ok(Json(state.service.cancel_order(&actor, OrderId(id))?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/edit-tests",
    params(("id" = u64, Path, description = "Order id")),
    request_body = TestEdit,
    responses(
        (status = 200, description = "Tests edited and order re-priced", body = OrderView),
        (status = 400, description = "Invalid edit or order already touched", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn edit_tests(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
    Json(req): Json<TestEdit>,
) -> ApiResult<OrderView> {
    Ok(Json(state.service.edit_tests(&actor, OrderId(id), req)?))
}

#[utoipa::path(
    get,
    path = "/orders/{id}/report-status",
    params(("id" = u64, Path, description = "Order id")),
    responses((status = 200, description = "Whether a report can be generated", body = ReportStatusRes))
)]
#[axum::debug_handler]
pub async fn report_status(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<ReportStatusRes> {
    Ok(Json(ReportStatusRes {
        can_generate: state.service.can_generate_report(OrderId(id))?,
    }))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/report",
    params(("id" = u64, Path, description = "Order id")),
    responses(
        (status = 201, description = "Report generated", body = ReportOutcome),
        (status = 200, description = "Report regenerated", body = ReportOutcome),
        (status = 400, description = "Not every result is published", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn generate_report(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> Created<ReportOutcome> {
    let outcome = state.service.generate_report(&actor, OrderId(id))?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

#[utoipa::path(
    get,
    path = "/orders/{id}/report",
    params(("id" = u64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Recorded report", body = Report),
        (status = 404, description = "No report generated yet", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_report(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Report> {
    state
        .service
        .report(OrderId(id))?
        .map(Json)
        .ok_or_else(|| {
            ApiError::Lims(lims_core::LimsError::NotFound {
                entity: "report",
                id: format!("for order {id}"),
            })
        })
}

// ============================================================================
// SAMPLES
// ============================================================================

#[utoipa::path(
    post,
    path = "/order-items/{id}/sample",
    params(("id" = u64, Path, description = "Order item id")),
    responses(
        (status = 201, description = "Sample created", body = Sample),
        (status = 400, description = "Item already has a sample", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn create_sample(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> Created<Sample> {
    created(state.service.create_sample(&actor, OrderItemId(id))?)
}

#[utoipa::path(
    get,
    path = "/samples",
    params(StatusFilter),
    responses((status = 200, description = "Samples in the requested status", body = [Sample]))
)]
#[axum::debug_handler]
pub async fn list_samples(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Vec<Sample>> {
    let status = match filter.status {
        Some(s) => s.parse::<SampleStatus>()?,
        None => SampleStatus::Pending,
    };
    Ok(Json(state.service.worklist_samples(status)?))
}

#[utoipa::path(
    get,
    path = "/samples/{id}",
    params(("id" = u64, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Sample", body = Sample),
        (status = 404, description = "Unknown sample", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_sample(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Sample> {
    Ok(Json(state.service.sample(SampleId(id))?))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/collect",
    params(("id" = u64, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Sample collected", body = Sample),
        (status = 400, description = "Sample is not PENDING", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn collect_sample(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> ApiResult<Sample> {
    Ok(Json(state.service.collect_sample(&actor, SampleId(id))?))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/receive",
    params(("id" = u64, Path, description = "Sample id")),
    responses(
        (status = 200, description = "Sample received", body = Sample),
        (status = 400, description = "Sample is not COLLECTED", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn receive_sample(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> ApiResult<Sample> {
    Ok(Json(state.service.receive_sample(&actor, SampleId(id))?))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/reject",
    params(("id" = u64, Path, description = "Sample id")),
    request_body = ReasonReq,
    responses(
        (status = 200, description = "Sample rejected", body = Sample),
        (status = 400, description = "Missing reason or sample not rejectable", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn reject_sample(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
    Json(req): Json<ReasonReq>,
) -> ApiResult<Sample> {
    Ok(Json(
        state
            .service
            .reject_sample(&actor, SampleId(id), &req.reason)?,
    ))
}

// ============================================================================
// RESULTS
// ============================================================================

#[utoipa::path(
    post,
    path = "/order-items/{id}/result",
    params(("id" = u64, Path, description = "Order item id")),
    responses(
        (status = 201, description = "Draft result opened", body = LabResult),
        (status = 400, description = "Sample not received or result exists", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn create_result(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> Created<LabResult> {
    created(state.service.create_result(&actor, OrderItemId(id))?)
}

#[utoipa::path(
    get,
    path = "/results",
    params(StatusFilter),
    responses((status = 200, description = "Results in the requested status", body = [LabResult]))
)]
#[axum::debug_handler]
pub async fn list_results(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Vec<LabResult>> {
    let status = match filter.status {
        Some(s) => s.parse::<ResultStatus>()?,
        None => ResultStatus::Draft,
    };
    Ok(Json(state.service.worklist_results(status)?))
}

#[utoipa::path(
    get,
    path = "/results/{id}",
    params(("id" = u64, Path, description = "Result id")),
    responses(
        (status = 200, description = "Result", body = LabResult),
        (status = 404, description = "Unknown result", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn get_result(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<LabResult> {
    Ok(Json(state.service.result(ResultId(id))?))
}

#[utoipa::path(
    post,
    path = "/results/{id}/enter",
    params(("id" = u64, Path, description = "Result id")),
    request_body = ResultEntry,
    responses(
        (status = 200, description = "Result entered", body = LabResult),
        (status = 400, description = "Empty value or result not DRAFT", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn enter_result(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
    Json(req): Json<ResultEntry>,
) -> ApiResult<LabResult> {
    Ok(Json(state.service.enter_result(&actor, ResultId(id), req)?))
}

#[utoipa::path(
    post,
    path = "/results/{id}/verify",
    params(("id" = u64, Path, description = "Result id")),
    responses(
        (status = 200, description = "Result verified", body = LabResult),
        (status = 400, description = "Result is not ENTERED", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn verify_result(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> ApiResult<LabResult> {
    Ok(Json(state.service.verify_result(&actor, ResultId(id))?))
}

#[utoipa::path(
    post,
    path = "/results/{id}/publish",
    params(("id" = u64, Path, description = "Result id")),
    responses(
        (status = 200, description = "Result published", body = LabResult),
        (status = 400, description = "Result is not publishable", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn publish_result(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
) -> ApiResult<LabResult> {
    Ok(Json(state.service.publish_result(&actor, ResultId(id))?))
}

#[utoipa::path(
    post,
    path = "/results/{id}/reject",
    params(("id" = u64, Path, description = "Result id")),
    request_body = ReasonReq,
    responses(
        (status = 200, description = "Result returned to DRAFT", body = LabResult),
        (status = 400, description = "Missing reason or result not rejectable", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn reject_result(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
    Json(req): Json<ReasonReq>,
) -> ApiResult<LabResult> {
    Ok(Json(
        state
            .service
            .reject_result(&actor, ResultId(id), &req.reason)?,
    ))
}

// ============================================================================
// ADMINISTRATION
// ============================================================================

#[utoipa::path(
    get,
    path = "/settings/workflow",
    responses((status = 200, description = "Workflow settings in force", body = WorkflowSettings))
)]
#[axum::debug_handler]
pub async fn get_workflow_settings(State(state): State<AppState>) -> ApiResult<WorkflowSettings> {
    Ok(Json(state.service.workflow_settings()?))
}

#[utoipa::path(
    put,
    path = "/settings/workflow",
    request_body = WorkflowSettingsUpdate,
    responses(
        (status = 200, description = "Settings saved", body = WorkflowSettings),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn update_workflow_settings(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(req): Json<WorkflowSettingsUpdate>,
) -> ApiResult<WorkflowSettings> {
    Ok(Json(state.service.update_workflow_settings(&actor, req)?))
}

#[utoipa::path(
    get,
    path = "/permissions",
    responses((status = 200, description = "Effective capabilities per role", body = [EffectivePermission]))
)]
#[axum::debug_handler]
pub async fn list_permissions(State(state): State<AppState>) -> ApiResult<Vec<EffectivePermission>> {
    Ok(Json(state.service.effective_permissions()?))
}

#[utoipa::path(
    put,
    path = "/permissions/{role}",
    params(("role" = Role, Path, description = "Role to override")),
    request_body = Capabilities,
    responses(
        (status = 200, description = "Override stored", body = EffectivePermission),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn set_permission(
    State(state): State<AppState>,
    Path(role): Path<String>,
    RequestActor(actor): RequestActor,
    Json(req): Json<Capabilities>,
) -> ApiResult<EffectivePermission> {
    let role = role.parse::<Role>()?;
    Ok(Json(state.service.set_role_permission(&actor, role, req)?))
}

#[utoipa::path(
    delete,
    path = "/permissions/{role}",
    params(("role" = Role, Path, description = "Role to reset")),
    responses(
        (status = 200, description = "Defaults restored", body = EffectivePermission),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn reset_permission(
    State(state): State<AppState>,
    Path(role): Path<String>,
    RequestActor(actor): RequestActor,
) -> ApiResult<EffectivePermission> {
    let role = role.parse::<Role>()?;
    Ok(Json(state.service.reset_role_permission(&actor, role)?))
}

#[utoipa::path(
    get,
    path = "/permissions/check",
    params(ActionQuery),
    responses(
        (status = 200, description = "Whether the caller may perform the action", body = AllowedRes),
        (status = 401, description = "Missing actor headers", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn check_permission(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Query(query): Query<ActionQuery>,
) -> ApiResult<AllowedRes> {
    let action = query.action.parse::<ActionKind>()?;
    Ok(Json(AllowedRes {
        role: actor.role,
        action,
        allowed: state.service.is_allowed(&actor, action)?,
    }))
}

#[utoipa::path(
    get,
    path = "/tests",
    responses((status = 200, description = "Catalog tests ordered by code", body = [TestDefinition]))
)]
#[axum::debug_handler]
pub async fn list_tests(State(state): State<AppState>) -> ApiResult<Vec<TestDefinition>> {
    Ok(Json(state.service.catalog().tests()?))
}

#[utoipa::path(
    post,
    path = "/tests",
    request_body = TestDefinitionInput,
    responses(
        (status = 201, description = "Test created", body = TestDefinition),
        (status = 400, description = "Invalid test", body = ErrorBody),
        (status = 403, description = "Not permitted", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(req): Json<TestDefinitionInput>,
) -> Created<TestDefinition> {
    created(state.service.upsert_test(&actor, None, req)?)
}

#[utoipa::path(
    put,
    path = "/tests/{id}",
    params(("id" = u64, Path, description = "Test id")),
    request_body = TestDefinitionInput,
    responses(
        (status = 200, description = "Test replaced", body = TestDefinition),
        (status = 404, description = "Unknown test", body = ErrorBody)
    )
)]
#[axum::debug_handler]
pub async fn update_test(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    RequestActor(actor): RequestActor,
    Json(req): Json<TestDefinitionInput>,
) -> ApiResult<TestDefinition> {
    Ok(Json(state.service.upsert_test(&actor, Some(TestId(id)), req)?))
}
