use super::{now, LabService};
use crate::actor::Actor;
use crate::constants::MRN_PREFIX;
use crate::error::{LimsError, LimsResult};
use crate::ids::PatientId;
use crate::numbering::daily_number;
use crate::patient::{NewPatient, Patient};
use crate::permissions::{authorize, ActionKind};
use crate::store::Store;

impl<S: Store> LabService<S> {
    /// Registers a patient and assigns an MRN.
    ///
    /// # Errors
    ///
    /// * `PermissionDenied` unless the actor may `REGISTER_PATIENT`
    /// * `InvalidArgument` for malformed fields or a CNIC that is already registered
    pub fn register_patient(&self, actor: &Actor, payload: NewPatient) -> LimsResult<Patient> {
        let patient = self.transact("register_patient", |tx| {
            authorize(tx.permissions(), actor, ActionKind::RegisterPatient)?;

            let at = now();
            let mut record = payload.clone().into_record(at.date_naive(), at)?;
            if tx.patient_by_cnic(&record.cnic)?.is_some() {
                return Err(LimsError::InvalidArgument(format!(
                    "a patient with cnic {} is already registered",
                    record.cnic
                )));
            }

            let sequence = tx.next_sequence(MRN_PREFIX, at.date_naive())?;
            record.mrn = daily_number(MRN_PREFIX, at.date_naive(), sequence);
            tx.insert_patient(record)
        })?;

        tracing::info!(patient_id = %patient.id, mrn = %patient.mrn, actor_id = %actor.id, "patient registered");
        Ok(patient)
    }

    pub fn patient(&self, id: PatientId) -> LimsResult<Patient> {
        self.store.read(|tx| tx.patient(id))
    }

    pub fn patients(&self) -> LimsResult<Vec<Patient>> {
        self.store.read(|tx| tx.patients())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LimsError;
    use crate::patient::{NewPatient, Sex};
    use crate::permissions::Role;
    use crate::services::testing::{actor, fixture};
    use chrono::{NaiveDate, Utc};

    fn payload(cnic: &str) -> NewPatient {
        NewPatient {
            full_name: "Bilal Ahmed".into(),
            father_name: "Ahmed Raza".into(),
            dob: NaiveDate::from_ymd_opt(1985, 1, 2).unwrap(),
            sex: Sex::Male,
            phone: "+923331112222".into(),
            cnic: cnic.into(),
            address: String::new(),
        }
    }

    #[test]
    fn mrns_follow_the_daily_sequence() {
        let fx = fixture();
        let reception = actor(Role::Reception);
        let first = fx
            .service
            .register_patient(&reception, payload("11111-1111111-1"))
            .unwrap();
        let second = fx
            .service
            .register_patient(&reception, payload("22222-2222222-2"))
            .unwrap();

        let day = Utc::now().format("%Y%m%d").to_string();
        assert_eq!(first.mrn, format!("PAT-{day}-0001"));
        assert_eq!(second.mrn, format!("PAT-{day}-0002"));
        assert_eq!(fx.service.patient(second.id).unwrap(), second);
    }

    #[test]
    fn duplicate_cnic_is_refused() {
        let fx = fixture();
        let reception = actor(Role::Reception);
        fx.service
            .register_patient(&reception, payload("11111-1111111-1"))
            .unwrap();
        let err = fx
            .service
            .register_patient(&reception, payload("11111-1111111-1"))
            .expect_err("duplicate");
        assert!(matches!(err, LimsError::InvalidArgument(_)));
        assert_eq!(fx.service.patients().unwrap().len(), 1);
    }

    #[test]
    fn technologist_cannot_register() {
        let fx = fixture();
        let err = fx
            .service
            .register_patient(&actor(Role::Technologist), payload("11111-1111111-1"))
            .expect_err("not permitted");
        assert!(matches!(err, LimsError::PermissionDenied { .. }));
    }
}
