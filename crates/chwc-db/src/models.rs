use diesel::prelude::*;

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::chwc::account)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Account {
    pub id: i32,
    pub logon_name: String,
    pub pass_phrase: String,
    pub role: String,
    pub student_number: Option<String>,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::chwc::account)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewAccount {
    pub logon_name: String,
    pub pass_phrase: String,
    pub role: String,
    pub student_number: Option<String>,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::chwc::onboarding)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Onboarding {
    pub id: i32,
    pub student_number: String,
    pub encrypted_details: Vec<u8>,
    pub completed_on: jiff_diesel::Date,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::chwc::onboarding)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewOnboarding {
    pub student_number: String,
    pub encrypted_details: Vec<u8>,
    pub completed_on: jiff_diesel::Date,
    pub created: jiff_diesel::Timestamp,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::chwc::proof_submission)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProofSubmission {
    pub id: i32,
    pub student_number: String,
    pub file_name: String,
    pub file_reference: String,
    pub file_size: i64,
    pub mimetype: String,
    pub uploaded_at: jiff_diesel::Timestamp,
    pub approval_status: String,
    pub approved_at: Option<jiff_diesel::Timestamp>,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::chwc::proof_submission)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewProofSubmission {
    pub student_number: String,
    pub file_name: String,
    pub file_reference: String,
    pub file_size: i64,
    pub mimetype: String,
    pub uploaded_at: jiff_diesel::Timestamp,
    pub approval_status: String,
    pub updated: jiff_diesel::Timestamp,
}

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::chwc::appointment)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Appointment {
    pub id: i32,
    pub reference_number: String,
    pub student_number: String,
    pub appointment_type: String,
    pub appointment_for: String,
    pub appointment_date: Option<jiff_diesel::Date>,
    pub appointment_time: jiff_diesel::Time,
    pub previous_appointment_ref: Option<String>,
    pub status: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::chwc::appointment)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewAppointment {
    pub reference_number: String,
    pub student_number: String,
    pub appointment_type: String,
    pub appointment_for: String,
    pub appointment_date: Option<jiff_diesel::Date>,
    pub appointment_time: jiff_diesel::Time,
    pub previous_appointment_ref: Option<String>,
    pub status: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

/// Columns a booking modification is allowed to touch.
#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::chwc::appointment)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AppointmentChanges {
    pub appointment_date: jiff_diesel::Date,
    pub appointment_time: jiff_diesel::Time,
    pub appointment_for: String,
    pub status: String,
    pub updated_at: jiff_diesel::Timestamp,
}

#[derive(Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::schema::chwc::emergency_report)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EmergencyReport {
    pub id: i32,
    #[diesel(embed)]
    pub fields: EmergencyReportFields,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

/// Every captured column of an emergency report, shared by insert, update and select so the
/// column list only exists once.
#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::chwc::emergency_report)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct EmergencyReportFields {
    pub incident_date: jiff_diesel::Date,
    pub time_of_call: jiff_diesel::Time,
    pub person_responsible: String,
    pub caller_name: String,
    pub department: String,
    pub contact_number: String,
    pub problem_nature: String,
    pub east_campus: bool,
    pub west_campus: bool,
    pub education_campus: bool,
    pub other_campus: bool,
    pub building: Option<String>,
    pub room_number: Option<String>,
    pub floor: Option<String>,
    pub other_location: Option<String>,
    pub staff_informed: String,
    pub notification_time: jiff_diesel::Time,
    pub team_responding: String,
    pub time_left_clinic: jiff_diesel::Time,
    pub chwc_vehicle: bool,
    pub sisters_on_foot: bool,
    pub other_transport: bool,
    pub other_transport_detail: Option<String>,
    pub arrival_time: jiff_diesel::Time,
    pub student_number: String,
    pub patient_name: String,
    pub patient_surname: String,
    pub primary_assessment: String,
    pub intervention: String,
    pub medical_consent: String,
    pub transport_consent: String,
    pub signature: String,
    pub consent_date: jiff_diesel::Date,
    pub pt_chwc_vehicle: bool,
    pub pt_ambulance: bool,
    pub pt_other: bool,
    pub pt_other_detail: Option<String>,
    pub patient_transported_to: String,
    pub departure_time: jiff_diesel::Time,
    pub chwc_arrival_time: jiff_diesel::Time,
    pub existing_file: bool,
    pub referred: bool,
    pub hospital_name: Option<String>,
    pub discharge_condition: String,
    pub discharge_time: jiff_diesel::Time,
}

/// The columns shown in the emergency report list.
#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::chwc::emergency_report)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EmergencyReportSummary {
    pub id: i32,
    pub incident_date: jiff_diesel::Date,
    pub time_of_call: jiff_diesel::Time,
    pub caller_name: String,
    pub department: String,
    pub student_number: String,
    pub patient_name: String,
    pub patient_surname: String,
    pub created_at: jiff_diesel::Timestamp,
}
