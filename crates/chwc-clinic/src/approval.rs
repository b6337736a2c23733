//! Proof of registration uploads and the administrator's decision on them.

use crate::{
    clinic::Clinic,
    domain::{Caller, Decision, NewProof, ProofSubmission, StudentNumber},
    error::Error,
    login::{caller, BackEnd},
    store::StoreError,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    Json,
};
use axum_login::AuthSession;
use std::path::{Path as FsPath, PathBuf};

/// Where uploaded documents are kept, one file per submission named by its file reference.
#[derive(Clone, Debug)]
pub struct UploadDir(PathBuf);

impl UploadDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(dir.into())
    }

    pub fn path(&self) -> &FsPath {
        &self.0
    }

    #[tracing::instrument(skip(self, contents), fields(size = contents.len()))]
    async fn store(&self, contents: &[u8]) -> Result<String, Error> {
        let file_reference = uuid::Uuid::new_v4().to_string();
        tokio::fs::write(self.0.join(&file_reference), contents)
            .await
            .map_err(|err| Error::Internal(format!("writing upload: {err}")))?;
        Ok(file_reference)
    }

    async fn discard(&self, file_reference: &str) {
        if let Err(err) = tokio::fs::remove_file(self.0.join(file_reference)).await {
            tracing::warn!(%err, file_reference, "unable to remove orphaned upload");
        }
    }
}

impl Clinic {
    #[tracing::instrument(skip(self, caller))]
    pub async fn latest_proof(
        &self,
        caller: &Caller,
        student: &StudentNumber,
    ) -> Result<ProofSubmission, Error> {
        caller.ensure_admin()?;
        self.within(self.store().latest_proof(student))
            .await?
            .ok_or_else(|| Error::NotFound("No proof of registration found for this student".into()))
    }

    /// Approves or rejects the latest submission. `reviewed` is the submission the
    /// administrator looked at; a newer upload since then makes the decision stale.
    #[tracing::instrument(skip(self, caller))]
    pub async fn decide(
        &self,
        caller: &Caller,
        student: &StudentNumber,
        decision: &str,
        reviewed: Option<i32>,
    ) -> Result<ProofSubmission, Error> {
        caller.ensure_admin()?;
        let decision = Decision::parse(decision)?;
        match self
            .within(self.store().decide_latest_proof(student, decision, reviewed))
            .await
        {
            Ok(decided) => {
                tracing::info!(%student, id = decided.id, ?decision, "proof of registration decided");
                Ok(decided)
            }
            Err(StoreError::Db(chwc_db::Error::NotFound)) => Err(Error::NotFound(
                "No proof of registration found to update".into(),
            )),
            Err(StoreError::Db(chwc_db::Error::Stale)) => {
                tracing::info!(%student, ?reviewed, "decision on superseded submission refused");
                Err(Error::StaleSubmission)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Uploads are for the caller's own number and only after onboarding.
    pub async fn ensure_may_upload(
        &self,
        caller: &Caller,
        student: &StudentNumber,
    ) -> Result<(), Error> {
        caller.ensure_may_act_for(student)?;
        if !self.is_onboarded(student).await? {
            tracing::info!(%student, "upload refused, onboarding incomplete");
            return Err(Error::OnboardingRequired);
        }
        Ok(())
    }

    /// Adds a pending submission; it becomes the latest and older ones stay as history.
    #[tracing::instrument(skip(self, caller))]
    pub async fn record_upload(
        &self,
        caller: &Caller,
        proof: NewProof,
    ) -> Result<ProofSubmission, Error> {
        self.ensure_may_upload(caller, &proof.student_number).await?;
        Ok(self.within(self.store().insert_proof(proof)).await?)
    }

    pub async fn list_proofs(
        &self,
        caller: &Caller,
        student: &StudentNumber,
    ) -> Result<Vec<ProofSubmission>, Error> {
        caller.ensure_may_act_for(student)?;
        Ok(self.within(self.store().list_proofs(student)).await?)
    }
}

pub mod por {
    use super::*;

    #[derive(serde::Serialize)]
    pub struct LatestProof {
        por: ProofSubmission,
    }

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(student_number): Path<String>,
    ) -> Result<Json<LatestProof>, Error> {
        let caller = caller(&auth_session)?;
        let student = StudentNumber::parse(&student_number)?;
        let por = app_state.clinic.latest_proof(&caller, &student).await?;
        Ok(Json(LatestProof { por }))
    }
}

pub mod por_decision {
    use super::*;

    #[derive(Debug, Default, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct DecisionRequest {
        decision: String,
        submission_id: Option<i32>,
    }

    #[derive(serde::Serialize)]
    pub struct Decided {
        message: String,
        por: ProofSubmission,
    }

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(student_number): Path<String>,
        payload: Result<Json<DecisionRequest>, JsonRejection>,
    ) -> Result<Json<Decided>, Error> {
        let caller = caller(&auth_session)?;
        let Json(request) = payload?;
        let student = StudentNumber::parse(&student_number)?;
        let por = app_state
            .clinic
            .decide(&caller, &student, &request.decision, request.submission_id)
            .await?;
        Ok(Json(Decided {
            message: format!("POR {} successfully", por.approval_status.as_str()),
            por,
        }))
    }
}

pub mod upload_por {
    use super::*;

    #[derive(serde::Serialize)]
    pub struct Uploaded {
        message: &'static str,
        file: ProofSubmission,
    }

    struct Document {
        file_name: String,
        mimetype: String,
        contents: Vec<u8>,
    }

    async fn read_form(mut multipart: Multipart) -> Result<(Option<String>, Option<Document>), Error> {
        let invalid = |err: axum::extract::multipart::MultipartError| Error::Validation(err.body_text());
        let (mut student_number, mut document) = (None, None);
        while let Some(field) = multipart.next_field().await.map_err(invalid)? {
            match field.name() {
                Some("studentNumber") => student_number = Some(field.text().await.map_err(invalid)?),
                Some("document") => {
                    let file_name = field.file_name().unwrap_or("document").to_owned();
                    let mimetype = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_owned();
                    let contents = field.bytes().await.map_err(invalid)?.to_vec();
                    document = Some(Document {
                        file_name,
                        mimetype,
                        contents,
                    });
                }
                _ => {}
            }
        }
        Ok((student_number, document))
    }

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        multipart: Multipart,
    ) -> Result<Json<Uploaded>, Error> {
        let caller = caller(&auth_session)?;
        let (student_number, document) = read_form(multipart).await?;
        let student = StudentNumber::required(student_number.as_deref())?;
        let document = document
            .filter(|document| !document.contents.is_empty())
            .ok_or_else(|| Error::Validation("No file uploaded".into()))?;
        app_state.clinic.ensure_may_upload(&caller, &student).await?;

        let file_reference = app_state.uploads.store(&document.contents).await?;
        let proof = NewProof {
            student_number: student,
            file_name: document.file_name,
            file_reference: file_reference.clone(),
            file_size: document.contents.len() as i64,
            mimetype: document.mimetype,
        };
        match app_state.clinic.record_upload(&caller, proof).await {
            Ok(file) => Ok(Json(Uploaded {
                message: "File saved successfully!",
                file,
            })),
            Err(err) => {
                app_state.uploads.discard(&file_reference).await;
                Err(err)
            }
        }
    }
}

pub mod student_files {
    use super::*;

    #[derive(serde::Serialize)]
    pub struct Files {
        count: usize,
        files: Vec<ProofSubmission>,
    }

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(student_number): Path<String>,
    ) -> Result<Json<Files>, Error> {
        let caller = caller(&auth_session)?;
        let student = StudentNumber::parse(&student_number)?;
        let files = app_state.clinic.list_proofs(&caller, &student).await?;
        Ok(Json(Files {
            count: files.len(),
            files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ApprovalStatus, Role},
        memory::test_clinic,
        store::ClinicStore,
    };

    fn student() -> StudentNumber {
        StudentNumber::parse("12345").unwrap()
    }

    fn admin() -> Caller {
        Caller::staff(Role::Admin)
    }

    fn proof(file_name: &str) -> NewProof {
        NewProof {
            student_number: student(),
            file_name: file_name.into(),
            file_reference: uuid::Uuid::new_v4().to_string(),
            file_size: 1024,
            mimetype: "application/pdf".into(),
        }
    }

    async fn onboarded_clinic() -> (Clinic, std::sync::Arc<crate::memory::MemoryStore>) {
        let (clinic, store) = test_clinic();
        store
            .insert_onboarding(&student(), vec![1], jiff::civil::date(2025, 2, 1))
            .await
            .unwrap();
        (clinic, store)
    }

    #[tokio::test]
    async fn approval_is_visible_on_the_latest_proof() {
        let (clinic, _) = onboarded_clinic().await;
        let me = Caller::student(student());
        clinic.record_upload(&me, proof("por.pdf")).await.unwrap();

        clinic.decide(&admin(), &student(), "approved", None).await.unwrap();
        let latest = clinic.latest_proof(&admin(), &student()).await.unwrap();
        assert_eq!(latest.approval_status, ApprovalStatus::Approved);
        assert!(latest.approved_at.is_some());

        clinic.decide(&admin(), &student(), "rejected", None).await.unwrap();
        let latest = clinic.latest_proof(&admin(), &student()).await.unwrap();
        assert_eq!(latest.approval_status, ApprovalStatus::Rejected);
        assert!(latest.approved_at.is_none(), "rejection clears the approval time");
    }

    #[tokio::test]
    async fn deciding_twice_ends_in_the_same_state() {
        let (clinic, _) = onboarded_clinic().await;
        clinic
            .record_upload(&Caller::student(student()), proof("por.pdf"))
            .await
            .unwrap();
        let first = clinic.decide(&admin(), &student(), "approved", None).await.unwrap();
        let second = clinic.decide(&admin(), &student(), "approved", None).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.approval_status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn only_the_latest_submission_is_decided() {
        let (clinic, _) = onboarded_clinic().await;
        let me = Caller::student(student());
        let older = clinic.record_upload(&me, proof("first.pdf")).await.unwrap();
        let newer = clinic.record_upload(&me, proof("second.pdf")).await.unwrap();

        let decided = clinic.decide(&admin(), &student(), "approved", None).await.unwrap();
        assert_eq!(decided.id, newer.id);
        let history = clinic.list_proofs(&me, &student()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, newer.id, "newest first");
        assert_eq!(history[1].id, older.id);
        assert_eq!(history[1].approval_status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn a_decision_on_a_superseded_upload_is_refused() {
        let (clinic, _) = onboarded_clinic().await;
        let me = Caller::student(student());
        let reviewed = clinic.record_upload(&me, proof("first.pdf")).await.unwrap();
        clinic.record_upload(&me, proof("second.pdf")).await.unwrap();

        let result = clinic
            .decide(&admin(), &student(), "approved", Some(reviewed.id))
            .await;
        assert!(matches!(result, Err(Error::StaleSubmission)));
        assert!(!clinic.can_book(&student()).await.unwrap());
    }

    #[tokio::test]
    async fn it_validates_decisions() {
        let (clinic, _) = onboarded_clinic().await;
        assert!(matches!(
            clinic.decide(&admin(), &student(), "maybe", None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            clinic.decide(&admin(), &student(), "approved", None).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            clinic.latest_proof(&admin(), &student()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_administrators_decide() {
        let (clinic, _) = onboarded_clinic().await;
        clinic
            .record_upload(&Caller::student(student()), proof("por.pdf"))
            .await
            .unwrap();
        for caller in [Caller::student(student()), Caller::staff(Role::Nurse)] {
            assert!(matches!(
                clinic.decide(&caller, &student(), "approved", None).await,
                Err(Error::Forbidden)
            ));
        }
    }

    #[tokio::test]
    async fn uploads_need_onboarding_first() {
        let (clinic, store) = test_clinic();
        let result = clinic
            .record_upload(&Caller::student(student()), proof("por.pdf"))
            .await;
        assert!(matches!(result, Err(Error::OnboardingRequired)));
        assert_eq!(store.proof_count(&student()), 0);

        let other = Caller::student(StudentNumber::parse("99999").unwrap());
        assert!(matches!(
            clinic.record_upload(&other, proof("por.pdf")).await,
            Err(Error::Forbidden)
        ));
    }

    #[tokio::test]
    async fn uploaded_documents_land_in_the_upload_dir() {
        let dir = std::env::temp_dir().join(format!("chwc-uploads-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let uploads = UploadDir::new(&dir);
        let reference = uploads.store(b"%PDF-1.7").await.unwrap();
        assert_eq!(tokio::fs::read(dir.join(&reference)).await.unwrap(), b"%PDF-1.7");
        uploads.discard(&reference).await;
        assert!(!dir.join(&reference).exists());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
