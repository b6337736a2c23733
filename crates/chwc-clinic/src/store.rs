use crate::{
    domain::{
        Account, Appointment, AppointmentChanges, AppointmentOrder, AppointmentStatus,
        AppointmentType, ApprovalStatus, Decision, NewAppointment, NewProof, OnboardingRecord,
        ProofSubmission, Role, StudentNumber,
    },
    emergency::{
        CallDetails, Consent, Discharge, Dispatch, EmergencyReport, EmergencyReportSummary, Location,
        MedicalConsent, Patient, PatientTransport, StoredEmergencyReport,
        TransportConsent, YesNo,
    },
};
use async_trait::async_trait;
use chwc_db::models;
use jiff::civil::Date;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] chwc_db::Error),
    #[error("store call timed out after {0:?}")]
    TimedOut(Duration),
    #[error("stored record is not valid: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Db(chwc_db::Error::Duplicate(_)))
    }

    pub fn is_table_missing(&self) -> bool {
        matches!(self, StoreError::Db(chwc_db::Error::TableMissing(_)))
    }
}

/// Durable records behind the clinic workflows.
#[async_trait]
pub trait ClinicStore: std::fmt::Debug + Send + Sync {
    async fn load_account_by_logon_name(&self, name: &str) -> Result<Option<Account>, StoreError>;
    async fn load_account(&self, id: i32) -> Result<Option<Account>, StoreError>;

    async fn onboarding_exists(&self, student: &StudentNumber) -> Result<bool, StoreError>;
    /// Fails with a duplicate error when the student already has a record.
    async fn insert_onboarding(
        &self,
        student: &StudentNumber,
        encrypted_details: Vec<u8>,
        completed_on: Date,
    ) -> Result<OnboardingRecord, StoreError>;
    async fn load_onboarding(
        &self,
        student: &StudentNumber,
    ) -> Result<Option<OnboardingRecord>, StoreError>;

    async fn latest_proof(&self, student: &StudentNumber)
        -> Result<Option<ProofSubmission>, StoreError>;
    async fn list_proofs(&self, student: &StudentNumber) -> Result<Vec<ProofSubmission>, StoreError>;
    async fn insert_proof(&self, proof: NewProof) -> Result<ProofSubmission, StoreError>;
    /// Records `decision` on the latest submission only, atomically with selecting it.
    async fn decide_latest_proof(
        &self,
        student: &StudentNumber,
        decision: Decision,
        expected_id: Option<i32>,
    ) -> Result<ProofSubmission, StoreError>;

    async fn reference_number_exists(&self, reference: &str) -> Result<bool, StoreError>;
    /// Fails with a duplicate error when the reference number is taken.
    async fn insert_appointment(&self, appointment: NewAppointment)
        -> Result<Appointment, StoreError>;
    async fn load_appointment(&self, id: i32) -> Result<Option<Appointment>, StoreError>;
    async fn load_appointment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Appointment>, StoreError>;
    /// `None` when no scheduled appointment has that id.
    async fn update_scheduled_appointment(
        &self,
        id: i32,
        changes: AppointmentChanges,
    ) -> Result<Option<Appointment>, StoreError>;
    async fn cancel_appointment(&self, id: i32) -> Result<Appointment, StoreError>;
    async fn list_appointments_for_student(
        &self,
        student: &StudentNumber,
        order: AppointmentOrder,
    ) -> Result<Vec<Appointment>, StoreError>;
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_emergency_report(
        &self,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, StoreError>;
    async fn list_emergency_reports(&self) -> Result<Vec<EmergencyReportSummary>, StoreError>;
    async fn load_emergency_report(
        &self,
        id: i32,
    ) -> Result<Option<StoredEmergencyReport>, StoreError>;
    async fn update_emergency_report(
        &self,
        id: i32,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, StoreError>;
    async fn delete_emergency_report(&self, id: i32) -> Result<(), StoreError>;
}

#[async_trait]
impl ClinicStore for chwc_db::Store {
    async fn load_account_by_logon_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        self.load_account_by_logon_name(name)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn load_account(&self, id: i32) -> Result<Option<Account>, StoreError> {
        self.load_account_by_id(id)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn onboarding_exists(&self, student: &StudentNumber) -> Result<bool, StoreError> {
        Ok(self.onboarding_exists(student.as_str()).await?)
    }

    async fn insert_onboarding(
        &self,
        student: &StudentNumber,
        encrypted_details: Vec<u8>,
        completed_on: Date,
    ) -> Result<OnboardingRecord, StoreError> {
        self.insert_onboarding(student.to_string(), encrypted_details, completed_on)
            .await?
            .try_into()
    }

    async fn load_onboarding(
        &self,
        student: &StudentNumber,
    ) -> Result<Option<OnboardingRecord>, StoreError> {
        self.load_onboarding(student.as_str())
            .await?
            .map(OnboardingRecord::try_from)
            .transpose()
    }

    async fn latest_proof(
        &self,
        student: &StudentNumber,
    ) -> Result<Option<ProofSubmission>, StoreError> {
        self.latest_proof_submission(student.as_str())
            .await?
            .map(ProofSubmission::try_from)
            .transpose()
    }

    async fn list_proofs(&self, student: &StudentNumber) -> Result<Vec<ProofSubmission>, StoreError> {
        self.list_proof_submissions(student.as_str())
            .await?
            .into_iter()
            .map(ProofSubmission::try_from)
            .collect()
    }

    async fn insert_proof(&self, proof: NewProof) -> Result<ProofSubmission, StoreError> {
        self.insert_proof_submission(
            proof.student_number.to_string(),
            proof.file_name,
            proof.file_reference,
            proof.file_size,
            proof.mimetype,
        )
        .await?
        .try_into()
    }

    async fn decide_latest_proof(
        &self,
        student: &StudentNumber,
        decision: Decision,
        expected_id: Option<i32>,
    ) -> Result<ProofSubmission, StoreError> {
        self.decide_latest_proof_submission(
            student.as_str(),
            decision.status().as_str(),
            expected_id,
        )
        .await?
        .try_into()
    }

    async fn reference_number_exists(&self, reference: &str) -> Result<bool, StoreError> {
        Ok(self.reference_number_exists(reference).await?)
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Appointment, StoreError> {
        let now = jiff::Timestamp::now().into();
        let new_appointment = models::NewAppointment {
            reference_number: appointment.reference_number,
            student_number: appointment.student_number.to_string(),
            appointment_type: appointment.appointment_type.label().to_owned(),
            appointment_for: appointment.appointment_for,
            appointment_date: appointment.appointment_date.map(Into::into),
            appointment_time: appointment.appointment_time.into(),
            previous_appointment_ref: appointment.previous_appointment_ref,
            status: AppointmentStatus::Scheduled.as_str().to_owned(),
            created_at: now,
            updated_at: now,
        };
        self.insert_appointment(new_appointment).await?.try_into()
    }

    async fn load_appointment(&self, id: i32) -> Result<Option<Appointment>, StoreError> {
        self.load_appointment(id)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn load_appointment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Appointment>, StoreError> {
        self.load_appointment_by_reference(reference)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn update_scheduled_appointment(
        &self,
        id: i32,
        changes: AppointmentChanges,
    ) -> Result<Option<Appointment>, StoreError> {
        let changes = models::AppointmentChanges {
            appointment_date: changes.appointment_date.into(),
            appointment_time: changes.appointment_time.into(),
            appointment_for: changes.appointment_for,
            status: changes.status.as_str().to_owned(),
            updated_at: jiff::Timestamp::now().into(),
        };
        self.update_scheduled_appointment(id, changes)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn cancel_appointment(&self, id: i32) -> Result<Appointment, StoreError> {
        self.cancel_appointment(id).await?.try_into()
    }

    async fn list_appointments_for_student(
        &self,
        student: &StudentNumber,
        order: AppointmentOrder,
    ) -> Result<Vec<Appointment>, StoreError> {
        let rows = match order {
            AppointmentOrder::NewestCreated => {
                self.list_appointments_for_student(student.as_str()).await?
            }
            AppointmentOrder::LatestScheduled => {
                self.list_appointments_for_student_by_date(student.as_str())
                    .await?
            }
        };
        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        self.list_appointments()
            .await?
            .into_iter()
            .map(Appointment::try_from)
            .collect()
    }

    async fn insert_emergency_report(
        &self,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, StoreError> {
        self.insert_emergency_report(report.into())
            .await?
            .try_into()
    }

    async fn list_emergency_reports(&self) -> Result<Vec<EmergencyReportSummary>, StoreError> {
        Ok(self
            .list_emergency_reports()
            .await?
            .into_iter()
            .map(EmergencyReportSummary::from)
            .collect())
    }

    async fn load_emergency_report(
        &self,
        id: i32,
    ) -> Result<Option<StoredEmergencyReport>, StoreError> {
        self.load_emergency_report(id)
            .await?
            .map(StoredEmergencyReport::try_from)
            .transpose()
    }

    async fn update_emergency_report(
        &self,
        id: i32,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, StoreError> {
        self.update_emergency_report(id, report.into())
            .await?
            .try_into()
    }

    async fn delete_emergency_report(&self, id: i32) -> Result<(), StoreError> {
        Ok(self.delete_emergency_report(id).await?)
    }
}

fn stored_student_number(value: &str) -> Result<StudentNumber, StoreError> {
    StudentNumber::parse(value)
        .map_err(|_| StoreError::Corrupt(format!("student number {value:?}")))
}

impl TryFrom<models::Account> for Account {
    type Error = StoreError;

    fn try_from(account: models::Account) -> Result<Self, Self::Error> {
        let role = Role::from_stored(&account.role)
            .ok_or_else(|| StoreError::Corrupt(format!("account role {:?}", account.role)))?;
        let student_number = account
            .student_number
            .as_deref()
            .map(stored_student_number)
            .transpose()?;
        Ok(Account {
            id: account.id,
            logon_name: account.logon_name,
            pass_phrase: account.pass_phrase,
            role,
            student_number,
        })
    }
}

impl TryFrom<models::Onboarding> for OnboardingRecord {
    type Error = StoreError;

    fn try_from(onboarding: models::Onboarding) -> Result<Self, Self::Error> {
        Ok(OnboardingRecord {
            student_number: stored_student_number(&onboarding.student_number)?,
            encrypted_details: onboarding.encrypted_details,
            completed_on: onboarding.completed_on.to_jiff(),
        })
    }
}

impl TryFrom<models::ProofSubmission> for ProofSubmission {
    type Error = StoreError;

    fn try_from(submission: models::ProofSubmission) -> Result<Self, Self::Error> {
        let approval_status = ApprovalStatus::from_stored(&submission.approval_status)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("approval status {:?}", submission.approval_status))
            })?;
        Ok(ProofSubmission {
            id: submission.id,
            student_number: stored_student_number(&submission.student_number)?,
            file_name: submission.file_name,
            file_reference: submission.file_reference,
            file_size: submission.file_size,
            mimetype: submission.mimetype,
            uploaded_at: submission.uploaded_at.to_jiff(),
            approval_status,
            approved_at: submission.approved_at.map(|at| at.to_jiff()),
        })
    }
}

impl TryFrom<models::Appointment> for Appointment {
    type Error = StoreError;

    fn try_from(appointment: models::Appointment) -> Result<Self, Self::Error> {
        let appointment_type = AppointmentType::from_label(&appointment.appointment_type)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("appointment type {:?}", appointment.appointment_type))
            })?;
        let status = AppointmentStatus::from_stored(&appointment.status).ok_or_else(|| {
            StoreError::Corrupt(format!("appointment status {:?}", appointment.status))
        })?;
        Ok(Appointment {
            id: appointment.id,
            reference_number: appointment.reference_number,
            student_number: stored_student_number(&appointment.student_number)?,
            appointment_type,
            appointment_for: appointment.appointment_for,
            appointment_date: appointment.appointment_date.map(|date| date.to_jiff()),
            appointment_time: appointment.appointment_time.to_jiff(),
            previous_appointment_ref: appointment.previous_appointment_ref,
            status,
            created_at: appointment.created_at.to_jiff(),
            updated_at: appointment.updated_at.to_jiff(),
        })
    }
}

impl From<EmergencyReport> for models::EmergencyReportFields {
    fn from(
        EmergencyReport {
            call,
            location,
            dispatch,
            patient,
            consent,
            transport,
            discharge,
        }: EmergencyReport,
    ) -> Self {
        models::EmergencyReportFields {
            incident_date: call.date.into(),
            time_of_call: call.time_of_call.into(),
            person_responsible: call.person_responsible,
            caller_name: call.caller_name,
            department: call.department,
            contact_number: call.contact_number,
            problem_nature: call.problem_nature,
            east_campus: location.east_campus,
            west_campus: location.west_campus,
            education_campus: location.education_campus,
            other_campus: location.other_campus,
            building: location.building,
            room_number: location.room_number,
            floor: location.floor,
            other_location: location.other_location,
            staff_informed: dispatch.staff_informed,
            notification_time: dispatch.notification_time.into(),
            team_responding: dispatch.team_responding,
            time_left_clinic: dispatch.time_left_clinic.into(),
            chwc_vehicle: dispatch.chwc_vehicle,
            sisters_on_foot: dispatch.sisters_on_foot,
            other_transport: dispatch.other_transport,
            other_transport_detail: dispatch.other_transport_detail,
            arrival_time: dispatch.arrival_time.into(),
            student_number: patient.student_number,
            patient_name: patient.patient_name,
            patient_surname: patient.patient_surname,
            primary_assessment: patient.primary_assessment,
            intervention: patient.intervention,
            medical_consent: consent.medical_consent.as_stored().to_owned(),
            transport_consent: consent.transport_consent.as_stored().to_owned(),
            signature: consent.signature,
            consent_date: consent.consent_date.into(),
            pt_chwc_vehicle: transport.pt_chwc_vehicle,
            pt_ambulance: transport.pt_ambulance,
            pt_other: transport.pt_other,
            pt_other_detail: transport.pt_other_detail,
            patient_transported_to: transport.patient_transported_to,
            departure_time: transport.departure_time.into(),
            chwc_arrival_time: transport.chwc_arrival_time.into(),
            existing_file: discharge.existing_file.into(),
            referred: discharge.referred.into(),
            hospital_name: discharge.hospital_name,
            discharge_condition: discharge.discharge_condition,
            discharge_time: discharge.discharge_time.into(),
        }
    }
}

impl TryFrom<models::EmergencyReportFields> for EmergencyReport {
    type Error = StoreError;

    fn try_from(fields: models::EmergencyReportFields) -> Result<Self, Self::Error> {
        let medical_consent = MedicalConsent::from_stored(&fields.medical_consent)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("medical consent {:?}", fields.medical_consent))
            })?;
        let transport_consent = TransportConsent::from_stored(&fields.transport_consent)
            .ok_or_else(|| {
                StoreError::Corrupt(format!("transport consent {:?}", fields.transport_consent))
            })?;
        Ok(EmergencyReport {
            call: CallDetails {
                date: fields.incident_date.to_jiff(),
                time_of_call: fields.time_of_call.to_jiff(),
                person_responsible: fields.person_responsible,
                caller_name: fields.caller_name,
                department: fields.department,
                contact_number: fields.contact_number,
                problem_nature: fields.problem_nature,
            },
            location: Location {
                east_campus: fields.east_campus,
                west_campus: fields.west_campus,
                education_campus: fields.education_campus,
                other_campus: fields.other_campus,
                building: fields.building,
                room_number: fields.room_number,
                floor: fields.floor,
                other_location: fields.other_location,
            },
            dispatch: Dispatch {
                staff_informed: fields.staff_informed,
                notification_time: fields.notification_time.to_jiff(),
                team_responding: fields.team_responding,
                time_left_clinic: fields.time_left_clinic.to_jiff(),
                chwc_vehicle: fields.chwc_vehicle,
                sisters_on_foot: fields.sisters_on_foot,
                other_transport: fields.other_transport,
                other_transport_detail: fields.other_transport_detail,
                arrival_time: fields.arrival_time.to_jiff(),
            },
            patient: Patient {
                student_number: fields.student_number,
                patient_name: fields.patient_name,
                patient_surname: fields.patient_surname,
                primary_assessment: fields.primary_assessment,
                intervention: fields.intervention,
            },
            consent: Consent {
                medical_consent,
                transport_consent,
                signature: fields.signature,
                consent_date: fields.consent_date.to_jiff(),
            },
            transport: PatientTransport {
                pt_chwc_vehicle: fields.pt_chwc_vehicle,
                pt_ambulance: fields.pt_ambulance,
                pt_other: fields.pt_other,
                pt_other_detail: fields.pt_other_detail,
                patient_transported_to: fields.patient_transported_to,
                departure_time: fields.departure_time.to_jiff(),
                chwc_arrival_time: fields.chwc_arrival_time.to_jiff(),
            },
            discharge: Discharge {
                existing_file: YesNo::from(fields.existing_file),
                referred: YesNo::from(fields.referred),
                hospital_name: fields.hospital_name,
                discharge_condition: fields.discharge_condition,
                discharge_time: fields.discharge_time.to_jiff(),
            },
        })
    }
}

impl TryFrom<models::EmergencyReport> for StoredEmergencyReport {
    type Error = StoreError;

    fn try_from(report: models::EmergencyReport) -> Result<Self, Self::Error> {
        Ok(StoredEmergencyReport {
            id: report.id,
            report: report.fields.try_into()?,
            created_at: report.created_at.to_jiff(),
            updated_at: report.updated_at.to_jiff(),
        })
    }
}

impl From<models::EmergencyReportSummary> for EmergencyReportSummary {
    fn from(summary: models::EmergencyReportSummary) -> Self {
        EmergencyReportSummary {
            id: summary.id,
            date: summary.incident_date.to_jiff(),
            time_of_call: summary.time_of_call.to_jiff(),
            caller_name: summary.caller_name,
            department: summary.department,
            student_number: summary.student_number,
            patient_name: summary.patient_name,
            patient_surname: summary.patient_surname,
            created_at: summary.created_at.to_jiff(),
        }
    }
}
