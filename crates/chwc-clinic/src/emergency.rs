//! Emergency call-out reports captured by clinic staff. A report is a fixed record in seven
//! sections; every field maps to exactly one column.

use crate::{
    clinic::Clinic,
    domain::{clock_time, non_blank, require_fields, Caller},
    error::Error,
    login::{caller, BackEnd},
    store::StoreError,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use axum_login::AuthSession;
use jiff::civil::{Date, Time};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyReport {
    #[serde(flatten)]
    pub call: CallDetails,
    #[serde(flatten)]
    pub location: Location,
    #[serde(flatten)]
    pub dispatch: Dispatch,
    #[serde(flatten)]
    pub patient: Patient,
    #[serde(flatten)]
    pub consent: Consent,
    #[serde(flatten)]
    pub transport: PatientTransport,
    #[serde(flatten)]
    pub discharge: Discharge,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDetails {
    pub date: Date,
    #[serde(with = "clock_time")]
    pub time_of_call: Time,
    #[serde(default)]
    pub person_responsible: String,
    #[serde(default)]
    pub caller_name: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub problem_nature: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    pub east_campus: bool,
    pub west_campus: bool,
    pub education_campus: bool,
    pub other_campus: bool,
    pub building: Option<String>,
    pub room_number: Option<String>,
    pub floor: Option<String>,
    pub other_location: Option<String>,
}

/// Who was told, who went out and how they got there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    #[serde(default)]
    pub staff_informed: String,
    #[serde(with = "clock_time")]
    pub notification_time: Time,
    #[serde(default)]
    pub team_responding: String,
    #[serde(with = "clock_time")]
    pub time_left_clinic: Time,
    #[serde(default)]
    pub chwc_vehicle: bool,
    #[serde(default)]
    pub sisters_on_foot: bool,
    #[serde(default)]
    pub other_transport: bool,
    #[serde(default)]
    pub other_transport_detail: Option<String>,
    #[serde(with = "clock_time")]
    pub arrival_time: Time,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patient {
    pub student_number: String,
    pub patient_name: String,
    pub patient_surname: String,
    pub primary_assessment: String,
    pub intervention: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MedicalConsent {
    Give,
    DoNotGive,
}

impl MedicalConsent {
    pub fn as_stored(self) -> &'static str {
        match self {
            MedicalConsent::Give => "give",
            MedicalConsent::DoNotGive => "do-not-give",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "give" => Some(MedicalConsent::Give),
            "do-not-give" => Some(MedicalConsent::DoNotGive),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportConsent {
    Consent,
    DoNotConsent,
}

impl TransportConsent {
    pub fn as_stored(self) -> &'static str {
        match self {
            TransportConsent::Consent => "consent",
            TransportConsent::DoNotConsent => "do-not-consent",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "consent" => Some(TransportConsent::Consent),
            "do-not-consent" => Some(TransportConsent::DoNotConsent),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub medical_consent: MedicalConsent,
    pub transport_consent: TransportConsent,
    #[serde(default)]
    pub signature: String,
    pub consent_date: Date,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientTransport {
    #[serde(rename = "ptCHWCVehicle", default)]
    pub pt_chwc_vehicle: bool,
    #[serde(default)]
    pub pt_ambulance: bool,
    #[serde(default)]
    pub pt_other: bool,
    #[serde(default)]
    pub pt_other_detail: Option<String>,
    #[serde(default)]
    pub patient_transported_to: String,
    #[serde(with = "clock_time")]
    pub departure_time: Time,
    #[serde(with = "clock_time")]
    pub chwc_arrival_time: Time,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Yes,
    No,
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value {
            YesNo::Yes
        } else {
            YesNo::No
        }
    }
}

impl From<YesNo> for bool {
    fn from(value: YesNo) -> Self {
        value == YesNo::Yes
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discharge {
    pub existing_file: YesNo,
    pub referred: YesNo,
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub discharge_condition: String,
    #[serde(with = "clock_time")]
    pub discharge_time: Time,
}

impl EmergencyReport {
    fn validate(&self) -> Result<(), Error> {
        let present = |value: &str| non_blank(Some(value)).is_some();
        let detail = |value: &Option<String>| non_blank(value.as_deref()).is_some();
        require_fields(&[
            ("personResponsible", present(&self.call.person_responsible)),
            ("callerName", present(&self.call.caller_name)),
            ("department", present(&self.call.department)),
            ("contactNumber", present(&self.call.contact_number)),
            ("problemNature", present(&self.call.problem_nature)),
            ("staffInformed", present(&self.dispatch.staff_informed)),
            ("teamResponding", present(&self.dispatch.team_responding)),
            (
                "otherTransportDetail",
                !self.dispatch.other_transport || detail(&self.dispatch.other_transport_detail),
            ),
            ("studentNumber", present(&self.patient.student_number)),
            ("patientName", present(&self.patient.patient_name)),
            ("patientSurname", present(&self.patient.patient_surname)),
            ("primaryAssessment", present(&self.patient.primary_assessment)),
            ("intervention", present(&self.patient.intervention)),
            ("signature", present(&self.consent.signature)),
            (
                "ptOtherDetail",
                !self.transport.pt_other || detail(&self.transport.pt_other_detail),
            ),
            ("patientTransportedTo", present(&self.transport.patient_transported_to)),
            ("dischargeCondition", present(&self.discharge.discharge_condition)),
            (
                "hospitalName",
                self.discharge.referred == YesNo::No || detail(&self.discharge.hospital_name),
            ),
        ])
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEmergencyReport {
    pub id: i32,
    #[serde(flatten)]
    pub report: EmergencyReport,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyReportSummary {
    pub id: i32,
    pub date: Date,
    #[serde(with = "clock_time")]
    pub time_of_call: Time,
    pub caller_name: String,
    pub department: String,
    pub student_number: String,
    pub patient_name: String,
    pub patient_surname: String,
    pub created_at: jiff::Timestamp,
}

impl From<&StoredEmergencyReport> for EmergencyReportSummary {
    fn from(stored: &StoredEmergencyReport) -> Self {
        let report = &stored.report;
        EmergencyReportSummary {
            id: stored.id,
            date: report.call.date,
            time_of_call: report.call.time_of_call,
            caller_name: report.call.caller_name.clone(),
            department: report.call.department.clone(),
            student_number: report.patient.student_number.clone(),
            patient_name: report.patient.patient_name.clone(),
            patient_surname: report.patient.patient_surname.clone(),
            created_at: stored.created_at,
        }
    }
}

fn report_not_found(err: StoreError) -> Error {
    match err {
        StoreError::Db(chwc_db::Error::NotFound) => {
            Error::NotFound("Emergency report not found".into())
        }
        err => err.into(),
    }
}

impl Clinic {
    #[tracing::instrument(skip(self, caller, report))]
    pub async fn create_emergency_report(
        &self,
        caller: &Caller,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, Error> {
        caller.ensure_staff()?;
        report.validate()?;
        let stored = self
            .within(self.store().insert_emergency_report(report))
            .await?;
        tracing::info!(id = stored.id, "emergency report recorded");
        Ok(stored)
    }

    /// Newest first.
    pub async fn list_emergency_reports(
        &self,
        caller: &Caller,
    ) -> Result<Vec<EmergencyReportSummary>, Error> {
        caller.ensure_staff()?;
        match self.within(self.store().list_emergency_reports()).await {
            Err(err) if err.is_table_missing() => Ok(Vec::new()),
            listed => Ok(listed?),
        }
    }

    pub async fn load_emergency_report(
        &self,
        caller: &Caller,
        id: i32,
    ) -> Result<StoredEmergencyReport, Error> {
        caller.ensure_staff()?;
        self.within(self.store().load_emergency_report(id))
            .await?
            .ok_or_else(|| Error::NotFound("Emergency report not found".into()))
    }

    #[tracing::instrument(skip(self, caller, report))]
    pub async fn update_emergency_report(
        &self,
        caller: &Caller,
        id: i32,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, Error> {
        caller.ensure_staff()?;
        report.validate()?;
        self.within(self.store().update_emergency_report(id, report))
            .await
            .map_err(report_not_found)
    }

    #[tracing::instrument(skip(self, caller))]
    pub async fn delete_emergency_report(&self, caller: &Caller, id: i32) -> Result<(), Error> {
        caller.ensure_staff()?;
        self.within(self.store().delete_emergency_report(id))
            .await
            .map_err(report_not_found)?;
        tracing::info!(id, "emergency report deleted");
        Ok(())
    }
}

#[derive(Serialize)]
pub struct Saved {
    message: &'static str,
    report: StoredEmergencyReport,
}

pub mod reports {
    use super::*;

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        payload: Result<Json<EmergencyReport>, JsonRejection>,
    ) -> Result<Json<Saved>, Error> {
        let caller = caller(&auth_session)?;
        let Json(report) = payload?;
        let report = app_state
            .clinic
            .create_emergency_report(&caller, report)
            .await?;
        Ok(Json(Saved {
            message: "Emergency report saved successfully",
            report,
        }))
    }

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
    ) -> Result<Json<Vec<EmergencyReportSummary>>, Error> {
        let caller = caller(&auth_session)?;
        Ok(Json(app_state.clinic.list_emergency_reports(&caller).await?))
    }
}

pub mod report {
    use super::*;

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(id): Path<i32>,
    ) -> Result<Json<StoredEmergencyReport>, Error> {
        let caller = caller(&auth_session)?;
        Ok(Json(app_state.clinic.load_emergency_report(&caller, id).await?))
    }

    pub async fn put(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(id): Path<i32>,
        payload: Result<Json<EmergencyReport>, JsonRejection>,
    ) -> Result<Json<Saved>, Error> {
        let caller = caller(&auth_session)?;
        let Json(report) = payload?;
        let report = app_state
            .clinic
            .update_emergency_report(&caller, id, report)
            .await?;
        Ok(Json(Saved {
            message: "Emergency report updated successfully",
            report,
        }))
    }

    #[derive(Serialize)]
    pub struct Deleted {
        message: &'static str,
    }

    pub async fn delete(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(id): Path<i32>,
    ) -> Result<Json<Deleted>, Error> {
        let caller = caller(&auth_session)?;
        app_state.clinic.delete_emergency_report(&caller, id).await?;
        Ok(Json(Deleted {
            message: "Emergency report deleted successfully",
        }))
    }
}

#[cfg(test)]
pub(crate) fn sample_report_json() -> serde_json::Value {
    serde_json::json!({
        "date": "2025-03-14",
        "timeOfCall": "13:05",
        "personResponsible": "Sister Mokoena",
        "callerName": "Campus Security",
        "department": "Protection Services",
        "contactNumber": "0115590000",
        "problemNature": "Student collapsed in lecture hall",
        "eastCampus": true,
        "building": "Wartenweiler",
        "floor": "2",
        "staffInformed": "Sister Naidoo",
        "notificationTime": "13:07",
        "teamResponding": "Sisters Mokoena and Naidoo",
        "timeLeftClinic": "13:10",
        "chwcVehicle": true,
        "arrivalTime": "13:16",
        "studentNumber": "12345",
        "patientName": "Thandi",
        "patientSurname": "Dlamini",
        "primaryAssessment": "Syncope, conscious on arrival",
        "intervention": "Vitals, oral glucose",
        "medicalConsent": "give",
        "transportConsent": "consent",
        "signature": "T. Dlamini",
        "consentDate": "2025-03-14",
        "ptCHWCVehicle": true,
        "patientTransportedTo": "CHWC",
        "departureTime": "13:30",
        "chwcArrivalTime": "13:40",
        "existingFile": "yes",
        "referred": "no",
        "dischargeCondition": "Stable",
        "dischargeTime": "15:00:00"
    })
}
