//! The one-time medical history intake. Only the student number and the completion date are
//! kept in clear; the form itself is stored encrypted.

use crate::{
    cipher::Cipher,
    clinic::Clinic,
    domain::{non_blank, parse_date, require_fields, Caller, OnboardingRecord, StudentNumber},
    error::Error,
    login::{caller, BackEnd},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use axum_login::AuthSession;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnboardingForm {
    pub student_number: String,
    pub surname: String,
    pub full_names: String,
    pub date_of_birth: String,
    pub gender: String,
    pub other_gender: Option<String>,

    pub physical_address: String,
    pub postal_address: String,
    pub code: String,
    pub email: String,
    pub cell: String,
    pub alt_number: Option<String>,

    pub emergency_name: String,
    pub emergency_relation: String,
    pub emergency_work_tel: Option<String>,
    pub emergency_cell: String,

    pub medical_conditions: String,
    pub operations: String,
    pub conditions_details: Option<String>,
    pub disability: String,
    pub disability_details: Option<String>,
    pub medication: String,
    pub medication_details: Option<String>,
    pub other_conditions: Option<String>,
    pub congenital: String,
    pub family_other: Option<String>,
    pub smoking: String,
    pub recreation: String,
    pub psychological: String,
    pub psychological_details: Option<String>,

    /// The date the form was signed.
    pub date: String,
    pub signature_data: Option<String>,
}

impl OnboardingForm {
    fn validate(&self) -> Result<(), Error> {
        let present = |value: &str| non_blank(Some(value)).is_some();
        require_fields(&[
            ("studentNumber", present(&self.student_number)),
            ("surname", present(&self.surname)),
            ("fullNames", present(&self.full_names)),
            ("dateOfBirth", present(&self.date_of_birth)),
            ("gender", present(&self.gender)),
            ("physicalAddress", present(&self.physical_address)),
            ("postalAddress", present(&self.postal_address)),
            ("code", present(&self.code)),
            ("email", present(&self.email)),
            ("cell", present(&self.cell)),
            ("emergencyName", present(&self.emergency_name)),
            ("emergencyRelation", present(&self.emergency_relation)),
            ("emergencyCell", present(&self.emergency_cell)),
            ("medicalConditions", present(&self.medical_conditions)),
            ("operations", present(&self.operations)),
            ("disability", present(&self.disability)),
            ("medication", present(&self.medication)),
            ("congenital", present(&self.congenital)),
            ("smoking", present(&self.smoking)),
            ("recreation", present(&self.recreation)),
            ("psychological", present(&self.psychological)),
            ("date", present(&self.date)),
        ])?;
        parse_date("dateOfBirth", &self.date_of_birth)?;
        Ok(())
    }
}

impl Clinic {
    /// Stores the form once. A second submission for the same student is refused and the
    /// stored record is left as it was.
    #[tracing::instrument(skip(self, caller, form, cipher), fields(student = %form.student_number))]
    pub async fn submit_onboarding(
        &self,
        caller: &Caller,
        mut form: OnboardingForm,
        cipher: &Cipher,
    ) -> Result<OnboardingRecord, Error> {
        let student = StudentNumber::parse(&form.student_number)?;
        caller.ensure_may_act_for(&student)?;
        form.validate()?;
        let completed_on = parse_date("date", &form.date)?;
        form.student_number = student.to_string();
        let plain = serde_json::to_vec(&form)
            .map_err(|err| Error::Internal(format!("serializing onboarding form: {err}")))?;
        let encrypted = cipher.encrypt(&plain)?;
        match self
            .within(self.store().insert_onboarding(&student, encrypted, completed_on))
            .await
        {
            Ok(record) => {
                tracing::info!("onboarding completed");
                Ok(record)
            }
            Err(err) if err.is_duplicate() => {
                tracing::info!("onboarding already completed");
                Err(Error::AlreadyCompleted)
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, caller, cipher))]
    pub async fn load_onboarding(
        &self,
        caller: &Caller,
        student: &StudentNumber,
        cipher: &Cipher,
    ) -> Result<OnboardingForm, Error> {
        caller.ensure_staff()?;
        let record = self
            .within(self.store().load_onboarding(student))
            .await?
            .ok_or_else(|| Error::NotFound("No onboarding record for this student".into()))?;
        let plain = cipher.decrypt(&record.encrypted_details)?;
        serde_json::from_slice(&plain)
            .map_err(|err| Error::Internal(format!("decoding onboarding form: {err}")))
    }
}

pub mod submit {
    use super::*;

    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Submitted {
        message: &'static str,
        student_number: StudentNumber,
        completed_on: jiff::civil::Date,
    }

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        payload: Result<Json<OnboardingForm>, JsonRejection>,
    ) -> Result<Json<Submitted>, Error> {
        let caller = caller(&auth_session)?;
        let Json(form) = payload?;
        let record = app_state
            .clinic
            .submit_onboarding(&caller, form, &app_state.cipher)
            .await?;
        Ok(Json(Submitted {
            message: "Form submitted successfully!",
            student_number: record.student_number,
            completed_on: record.completed_on,
        }))
    }
}

pub mod record {
    use super::*;

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(student_number): Path<String>,
    ) -> Result<Json<OnboardingForm>, Error> {
        let caller = caller(&auth_session)?;
        let student = StudentNumber::parse(&student_number)?;
        let form = app_state
            .clinic
            .load_onboarding(&caller, &student, &app_state.cipher)
            .await?;
        Ok(Json(form))
    }
}

#[cfg(test)]
pub(crate) fn complete_form(student_number: &str) -> OnboardingForm {
    OnboardingForm {
        student_number: student_number.into(),
        surname: "Dlamini".into(),
        full_names: "Thandi Grace".into(),
        date_of_birth: "2004-07-19".into(),
        gender: "female".into(),
        physical_address: "12 Jacaranda Street".into(),
        postal_address: "PO Box 44".into(),
        code: "0002".into(),
        email: "thandi@example.org".into(),
        cell: "0820000000".into(),
        emergency_name: "Sipho Dlamini".into(),
        emergency_relation: "brother".into(),
        emergency_cell: "0830000000".into(),
        medical_conditions: "asthma".into(),
        operations: "no".into(),
        disability: "no".into(),
        medication: "yes".into(),
        medication_details: Some("salbutamol inhaler".into()),
        congenital: "no".into(),
        smoking: "no".into(),
        recreation: "no".into(),
        psychological: "no".into(),
        date: "2025-02-03".into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cipher::test_cipher, domain::Role, memory::test_clinic, store::ClinicStore};

    fn student() -> StudentNumber {
        StudentNumber::parse("12345").unwrap()
    }

    #[tokio::test]
    async fn it_stores_the_form_encrypted() {
        let (clinic, store) = test_clinic();
        let cipher = test_cipher();
        let record = clinic
            .submit_onboarding(&Caller::student(student()), complete_form("12345"), &cipher)
            .await
            .unwrap();
        assert_eq!(record.completed_on, jiff::civil::date(2025, 2, 3));
        let stored = store.load_onboarding(&student()).await.unwrap().unwrap();
        let haystack = String::from_utf8_lossy(&stored.encrypted_details);
        assert!(!haystack.contains("asthma"), "medical history must not be stored in clear");

        let form = clinic
            .load_onboarding(&Caller::staff(Role::Nurse), &student(), &cipher)
            .await
            .unwrap();
        assert_eq!(form, complete_form("12345"));
    }

    #[tokio::test]
    async fn it_stores_the_trimmed_student_number() {
        let (clinic, _) = test_clinic();
        let cipher = test_cipher();
        clinic
            .submit_onboarding(&Caller::student(student()), complete_form(" 12345 "), &cipher)
            .await
            .unwrap();
        let form = clinic
            .load_onboarding(&Caller::staff(Role::Nurse), &student(), &cipher)
            .await
            .unwrap();
        assert_eq!(form.student_number, "12345");
    }

    #[tokio::test]
    async fn onboarding_is_write_once() {
        let (clinic, store) = test_clinic();
        let cipher = test_cipher();
        let me = Caller::student(student());
        clinic
            .submit_onboarding(&me, complete_form("12345"), &cipher)
            .await
            .unwrap();
        let before = store.load_onboarding(&student()).await.unwrap().unwrap();

        let second = OnboardingForm {
            surname: "Changed".into(),
            ..complete_form("12345")
        };
        let result = clinic.submit_onboarding(&me, second, &cipher).await;
        assert!(matches!(result, Err(Error::AlreadyCompleted)));
        let after = store.load_onboarding(&student()).await.unwrap().unwrap();
        assert_eq!(before.encrypted_details, after.encrypted_details);
    }

    #[tokio::test]
    async fn it_names_all_missing_fields() {
        let (clinic, _) = test_clinic();
        let form = OnboardingForm {
            surname: String::new(),
            emergency_cell: " ".into(),
            ..complete_form("12345")
        };
        match clinic
            .submit_onboarding(&Caller::student(student()), form, &test_cipher())
            .await
        {
            Err(Error::Validation(message)) => {
                assert!(message.contains("surname"), "{message}");
                assert!(message.contains("emergencyCell"), "{message}");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn students_cannot_read_onboarding_records() {
        let (clinic, _) = test_clinic();
        let cipher = test_cipher();
        let result = clinic
            .load_onboarding(&Caller::student(student()), &student(), &cipher)
            .await;
        assert!(matches!(result, Err(Error::Forbidden)));
        let result = clinic
            .load_onboarding(&Caller::staff(Role::Admin), &student(), &cipher)
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn it_reads_the_camel_case_form() {
        let form: OnboardingForm = serde_json::from_value(serde_json::json!({
            "studentNumber": "12345",
            "fullNames": "Thandi Grace",
            "emergencyWorkTel": "0110000000"
        }))
        .unwrap();
        assert_eq!(form.full_names, "Thandi Grace");
        assert_eq!(form.emergency_work_tel.as_deref(), Some("0110000000"));
        assert!(form.surname.is_empty());
    }
}
