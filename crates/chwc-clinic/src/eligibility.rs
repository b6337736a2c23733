//! Whether a student may move on through onboarding, proof upload and booking. Every answer
//! is derived from the store on each call; failures are reported, never read as "no".

use crate::{
    clinic::Clinic,
    domain::{ApprovalStatus, StudentNumber},
    error::Error,
    login::{caller, BackEnd},
    AppState,
};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use axum_login::AuthSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ProofStatus {
    pub exists: bool,
    pub approved: bool,
}

impl Clinic {
    #[tracing::instrument(skip(self))]
    pub async fn is_onboarded(&self, student: &StudentNumber) -> Result<bool, Error> {
        Ok(self.within(self.store().onboarding_exists(student)).await?)
    }

    /// Only the latest submission counts.
    #[tracing::instrument(skip(self))]
    pub async fn proof_status(&self, student: &StudentNumber) -> Result<ProofStatus, Error> {
        let latest = self.within(self.store().latest_proof(student)).await?;
        Ok(ProofStatus {
            exists: latest.is_some(),
            approved: latest
                .is_some_and(|proof| proof.approval_status == ApprovalStatus::Approved),
        })
    }

    /// Booking is gated on proof approval alone; onboarding gates the upload before it.
    pub async fn can_book(&self, student: &StudentNumber) -> Result<bool, Error> {
        Ok(self.proof_status(student).await?.approved)
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRequest {
    #[serde(default)]
    student_number: Option<String>,
}

pub mod check_onboarding {
    use super::*;

    #[derive(serde::Serialize)]
    pub struct OnboardingStatus {
        exists: bool,
    }

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        payload: Result<Json<StudentRequest>, JsonRejection>,
    ) -> Result<Json<OnboardingStatus>, Error> {
        let caller = caller(&auth_session)?;
        let Json(request) = payload?;
        let student = StudentNumber::required(request.student_number.as_deref())?;
        caller.ensure_may_act_for(&student)?;
        let exists = app_state.clinic.is_onboarded(&student).await?;
        Ok(Json(OnboardingStatus { exists }))
    }
}

pub mod check_por {
    use super::*;

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        payload: Result<Json<StudentRequest>, JsonRejection>,
    ) -> Result<Json<ProofStatus>, Error> {
        let caller = caller(&auth_session)?;
        let Json(request) = payload?;
        let student = StudentNumber::required(request.student_number.as_deref())?;
        caller.ensure_may_act_for(&student)?;
        Ok(Json(app_state.clinic.proof_status(&student).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Decision, NewProof},
        memory::test_clinic,
        store::ClinicStore,
    };

    fn student() -> StudentNumber {
        StudentNumber::parse("12345").unwrap()
    }

    fn proof(student: &StudentNumber) -> NewProof {
        NewProof {
            student_number: student.clone(),
            file_name: "registration.pdf".into(),
            file_reference: "3c1e".into(),
            file_size: 2048,
            mimetype: "application/pdf".into(),
        }
    }

    #[tokio::test]
    async fn it_cannot_book_without_any_proof() {
        let (clinic, _) = test_clinic();
        assert_eq!(
            clinic.proof_status(&student()).await.unwrap(),
            ProofStatus {
                exists: false,
                approved: false
            }
        );
        assert!(!clinic.can_book(&student()).await.unwrap());
    }

    #[tokio::test]
    async fn it_follows_the_latest_decision() {
        let (clinic, store) = test_clinic();
        store.insert_proof(proof(&student())).await.unwrap();
        assert!(!clinic.can_book(&student()).await.unwrap(), "pending does not allow booking");

        store
            .decide_latest_proof(&student(), Decision::Rejected, None)
            .await
            .unwrap();
        assert!(!clinic.can_book(&student()).await.unwrap(), "rejected does not allow booking");

        store
            .decide_latest_proof(&student(), Decision::Approved, None)
            .await
            .unwrap();
        assert!(clinic.can_book(&student()).await.unwrap());
    }

    #[tokio::test]
    async fn a_re_upload_needs_approval_again() {
        let (clinic, store) = test_clinic();
        store.insert_proof(proof(&student())).await.unwrap();
        store
            .decide_latest_proof(&student(), Decision::Approved, None)
            .await
            .unwrap();
        assert!(clinic.can_book(&student()).await.unwrap());

        store.insert_proof(proof(&student())).await.unwrap();
        let status = clinic.proof_status(&student()).await.unwrap();
        assert!(status.exists);
        assert!(!status.approved, "the newer pending upload is authoritative");
    }

    #[tokio::test]
    async fn it_fails_closed_when_the_store_is_unavailable() {
        let (clinic, store) = test_clinic();
        store.set_unavailable(true);
        assert!(matches!(
            clinic.can_book(&student()).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            clinic.is_onboarded(&student()).await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn it_sees_completed_onboarding() {
        let (clinic, store) = test_clinic();
        assert!(!clinic.is_onboarded(&student()).await.unwrap());
        store
            .insert_onboarding(&student(), vec![0; 16], jiff::civil::date(2025, 3, 1))
            .await
            .unwrap();
        assert!(clinic.is_onboarded(&student()).await.unwrap());
    }
}
