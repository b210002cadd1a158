//! # LIMS Core
//!
//! Lifecycle and authorization core of the laboratory information system.
//!
//! This crate owns:
//! - the sample, result and order state machines and the order status rollup
//! - the role permission gate consulted before every mutating operation
//! - workflow settings that make collection, receive and verification optional
//! - the report generation precondition
//!
//! **No API concerns**: HTTP routing, authentication and artifact layout belong in
//! `api-rest` and `lims-cli`. Persistence, the test catalog and report rendering are
//! reached through the [`store::Store`], [`catalog::Catalog`] and [`report::Renderer`]
//! traits.

pub mod actor;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod lab_result;
pub mod numbering;
pub mod order;
pub mod patient;
pub mod permissions;
pub mod report;
pub mod sample;
pub mod services;
pub mod store;
pub mod workflow;

pub use actor::Actor;
pub use catalog::{Catalog, InMemoryCatalog, TestDefinition, TestDefinitionInput};
pub use config::CoreConfig;
pub use error::{LimsError, LimsResult};
pub use ids::{OrderId, OrderItemId, PatientId, ReportId, ResultId, SampleId, TestId, UserId};
pub use lab_result::{LabResult, ResultEntry, ResultStatus};
pub use lims_types::NonEmptyText;
pub use order::{NewOrder, Order, OrderItem, OrderPriority, OrderStatus, OrderView, TestEdit};
pub use patient::{NewPatient, Patient, Sex};
pub use permissions::{ActionKind, Capabilities, EffectivePermission, Role, RolePermission};
pub use report::{MemoryRenderer, Renderer, Report, ReportDocument, ReportLine, ReportOutcome};
pub use sample::{Sample, SampleStatus};
pub use services::LabService;
pub use store::{InMemoryStore, Store, Transaction};
pub use workflow::{WorkflowSettings, WorkflowSettingsUpdate};
