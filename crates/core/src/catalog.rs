//! Test catalog collaborator.
//!
//! The workflow only needs a test's name, sample type, price and active flag; richer
//! catalog concerns (parameters, reference ranges) live elsewhere.

use crate::error::{LimsError, LimsResult};
use crate::ids::TestId;
use lims_types::NonEmptyText;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An orderable test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TestDefinition {
    pub id: TestId,
    pub code: String,
    pub name: String,
    /// Specimen collected for the test, e.g. `Blood`.
    pub sample_type: String,
    pub price: Decimal,
    pub turnaround_time_hours: u32,
    pub is_active: bool,
}

/// Catalog edit payload.
#[derive(Clone, Debug, Deserialize, utoipa::ToSchema)]
pub struct TestDefinitionInput {
    pub code: String,
    pub name: String,
    pub sample_type: String,
    pub price: Decimal,
    #[serde(default)]
    pub turnaround_time_hours: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl TestDefinitionInput {
    fn validate(self, id: TestId) -> LimsResult<TestDefinition> {
        let code = NonEmptyText::with_max_len(&self.code, 20)
            .map_err(|e| LimsError::InvalidArgument(format!("code: {e}")))?;
        let name = NonEmptyText::with_max_len(&self.name, 255)
            .map_err(|e| LimsError::InvalidArgument(format!("name: {e}")))?;
        let sample_type = NonEmptyText::with_max_len(&self.sample_type, 50)
            .map_err(|e| LimsError::InvalidArgument(format!("sample_type: {e}")))?;
        if self.price.is_sign_negative() {
            return Err(LimsError::InvalidArgument(
                "price cannot be negative".into(),
            ));
        }

        Ok(TestDefinition {
            id,
            code: code.into_inner(),
            name: name.into_inner(),
            sample_type: sample_type.into_inner(),
            price: self.price,
            turnaround_time_hours: self.turnaround_time_hours,
            is_active: self.is_active,
        })
    }
}

/// Source of test definitions.
pub trait Catalog: Send + Sync {
    /// Looks up a test, failing with `NotFound` for unknown ids.
    fn test(&self, id: TestId) -> LimsResult<TestDefinition>;

    /// All tests ordered by code.
    fn tests(&self) -> LimsResult<Vec<TestDefinition>>;

    /// Creates (`id == None`) or replaces a test definition.
    fn upsert(&self, id: Option<TestId>, input: TestDefinitionInput)
        -> LimsResult<TestDefinition>;
}

/// Catalog held in process memory.
#[derive(Default)]
pub struct InMemoryCatalog {
    inner: RwLock<CatalogTable>,
}

#[derive(Default)]
struct CatalogTable {
    next_id: u64,
    tests: BTreeMap<TestId, TestDefinition>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for seeding: creates a test and returns it.
    pub fn with_test(self, input: TestDefinitionInput) -> LimsResult<Self> {
        self.upsert(None, input)?;
        Ok(self)
    }
}

impl Catalog for InMemoryCatalog {
    fn test(&self, id: TestId) -> LimsResult<TestDefinition> {
        self.inner
            .read()
            .tests
            .get(&id)
            .cloned()
            .ok_or_else(|| LimsError::not_found("test", id))
    }

    fn tests(&self) -> LimsResult<Vec<TestDefinition>> {
        let mut tests: Vec<TestDefinition> = self.inner.read().tests.values().cloned().collect();
        tests.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(tests)
    }

    fn upsert(
        &self,
        id: Option<TestId>,
        input: TestDefinitionInput,
    ) -> LimsResult<TestDefinition> {
        let mut table = self.inner.write();

        let id = match id {
            Some(id) if table.tests.contains_key(&id) => id,
            Some(id) => return Err(LimsError::not_found("test", id)),
            None => TestId(table.next_id + 1),
        };
        let definition = input.validate(id)?;

        if table
            .tests
            .values()
            .any(|t| t.code.eq_ignore_ascii_case(&definition.code) && t.id != id)
        {
            return Err(LimsError::InvalidArgument(format!(
                "test code '{}' already exists",
                definition.code
            )));
        }

        table.next_id = table.next_id.max(id.0);
        table.tests.insert(id, definition.clone());
        Ok(definition)
    }
}
