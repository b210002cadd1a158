//! Patient registration records.

use crate::error::{LimsError, LimsResult};
use crate::ids::PatientId;
use chrono::{DateTime, NaiveDate, Utc};
use lims_types::NonEmptyText;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

/// A registered patient. Never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Patient {
    pub id: PatientId,
    /// Medical record number, unique across the lab.
    pub mrn: String,
    #[schema(value_type = String)]
    pub full_name: NonEmptyText,
    #[schema(value_type = String)]
    pub father_name: NonEmptyText,
    pub dob: NaiveDate,
    pub sex: Sex,
    pub phone: String,
    /// National identity number (`#####-#######-#`).
    pub cnic: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Registration payload.
#[derive(Clone, Debug, Deserialize, utoipa::ToSchema)]
pub struct NewPatient {
    pub full_name: String,
    pub father_name: String,
    pub dob: NaiveDate,
    pub sex: Sex,
    pub phone: String,
    pub cnic: String,
    #[serde(default)]
    pub address: String,
}

impl NewPatient {
    /// Validate the payload and build an unsaved patient record.
    ///
    /// `id`, `mrn` and `version` are filled in by the store on insert.
    pub(crate) fn into_record(self, today: NaiveDate, now: DateTime<Utc>) -> LimsResult<Patient> {
        let full_name = NonEmptyText::with_max_len(&self.full_name, 255)
            .map_err(|e| LimsError::InvalidArgument(format!("full_name: {e}")))?;
        let father_name = NonEmptyText::with_max_len(&self.father_name, 255)
            .map_err(|e| LimsError::InvalidArgument(format!("father_name: {e}")))?;

        if self.dob > today {
            return Err(LimsError::InvalidArgument(
                "dob cannot be in the future".into(),
            ));
        }

        let phone = self.phone.trim().to_string();
        validate_phone(&phone)?;
        let cnic = self.cnic.trim().to_string();
        validate_cnic(&cnic)?;

        Ok(Patient {
            id: PatientId(0),
            mrn: String::new(),
            full_name,
            father_name,
            dob: self.dob,
            sex: self.sex,
            phone,
            cnic,
            address: self.address.trim().to_string(),
            created_at: now,
            version: 0,
        })
    }
}

/// Validates a national identity number of the form `#####-#######-#`.
pub fn validate_cnic(cnic: &str) -> LimsResult<()> {
    let groups: Vec<&str> = cnic.split('-').collect();
    let ok = groups.len() == 3
        && groups
            .iter()
            .zip([5usize, 7, 1])
            .all(|(group, len)| group.len() == len && group.bytes().all(|b| b.is_ascii_digit()));

    if !ok {
        return Err(LimsError::InvalidArgument(
            "cnic must be in format #####-#######-#".into(),
        ));
    }
    Ok(())
}

/// Validates a phone number: 7 to 15 digits with an optional leading `+`.
pub fn validate_phone(phone: &str) -> LimsResult<()> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    let ok = (7..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());

    if !ok {
        return Err(LimsError::InvalidArgument(
            "phone must contain 7 to 15 digits with an optional leading '+'".into(),
        ));
    }
    Ok(())
}
