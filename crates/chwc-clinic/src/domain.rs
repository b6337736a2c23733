use crate::error::Error;
use itertools::Itertools;
use jiff::civil::{Date, Time};
use serde::Serialize;
use std::fmt;

/// The external identifier of a student, issued by the university.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StudentNumber(String);

impl StudentNumber {
    const MAX_LEN: usize = 50;

    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("Student number is required".into()));
        }
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(Error::Validation(format!(
                "Student number must be no more than {} characters",
                Self::MAX_LEN
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::Validation(
                "Student number must only consist of letters, digits and '-'".into(),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Parses an optional request field, treating absence like an empty value.
    pub fn required(raw: Option<&str>) -> Result<Self, Error> {
        Self::parse(raw.unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Nurse,
    Admin,
}

impl Role {
    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Role::Student),
            "nurse" => Some(Role::Nurse),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Who is making a request, as established by the login session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
    pub student_number: Option<StudentNumber>,
}

impl Caller {
    pub fn student(student_number: StudentNumber) -> Self {
        Self {
            role: Role::Student,
            student_number: Some(student_number),
        }
    }

    pub fn staff(role: Role) -> Self {
        Self {
            role,
            student_number: None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Nurse | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Staff act for any student; a student only for themselves.
    pub fn may_act_for(&self, student: &StudentNumber) -> bool {
        self.is_staff() || self.student_number.as_ref() == Some(student)
    }

    pub fn ensure_may_act_for(&self, student: &StudentNumber) -> Result<(), Error> {
        if self.may_act_for(student) {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    pub fn ensure_staff(&self) -> Result<(), Error> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    pub fn ensure_admin(&self) -> Result<(), Error> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

#[derive(Clone, Debug)]
pub struct Account {
    pub id: i32,
    pub logon_name: String,
    pub pass_phrase: String,
    pub role: Role,
    pub student_number: Option<StudentNumber>,
}

impl Account {
    pub fn caller(&self) -> Caller {
        Caller {
            role: self.role,
            student_number: self.student_number.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

/// An administrator's verdict on a proof of registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            _ => Err(Error::Validation(
                "Invalid decision - must be 'approved' or 'rejected'".into(),
            )),
        }
    }

    pub fn status(self) -> ApprovalStatus {
        match self {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProofSubmission {
    pub id: i32,
    pub student_number: StudentNumber,
    pub file_name: String,
    pub file_reference: String,
    pub file_size: i64,
    pub mimetype: String,
    pub uploaded_at: jiff::Timestamp,
    pub approval_status: ApprovalStatus,
    pub approved_at: Option<jiff::Timestamp>,
}

#[derive(Clone, Debug)]
pub struct NewProof {
    pub student_number: StudentNumber,
    pub file_name: String,
    pub file_reference: String,
    pub file_size: i64,
    pub mimetype: String,
}

#[derive(Clone, Debug)]
pub struct OnboardingRecord {
    pub student_number: StudentNumber,
    pub encrypted_details: Vec<u8>,
    pub completed_on: Date,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AppointmentType {
    #[serde(rename = "Follow-Up Booking")]
    FollowUp,
    #[serde(rename = "Health and Wellness Booking")]
    HealthAndWellness,
}

impl AppointmentType {
    /// Services offered on a same-day walk-in basis; they are booked by time only.
    const SAME_DAY_SERVICES: &'static [&'static str] = &["General Consultation"];

    pub fn label(self) -> &'static str {
        match self {
            AppointmentType::FollowUp => "Follow-Up Booking",
            AppointmentType::HealthAndWellness => "Health and Wellness Booking",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "Follow-Up Booking" => Some(AppointmentType::FollowUp),
            "Health and Wellness Booking" => Some(AppointmentType::HealthAndWellness),
            _ => None,
        }
    }

    pub fn requires_date(self, service: &str) -> bool {
        !(self == AppointmentType::HealthAndWellness && Self::SAME_DAY_SERVICES.contains(&service))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, Error> {
        Self::from_stored(value).ok_or_else(|| {
            Error::Validation("Invalid status - must be 'scheduled' or 'cancelled'".into())
        })
    }
}

/// What a booking looks like to a reader today. `Completed` is never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, Serialize)]
pub struct Appointment {
    pub id: i32,
    pub reference_number: String,
    pub student_number: StudentNumber,
    pub appointment_type: AppointmentType,
    pub appointment_for: String,
    pub appointment_date: Option<Date>,
    #[serde(with = "clock_time")]
    pub appointment_time: Time,
    pub previous_appointment_ref: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
}

impl Appointment {
    /// Date-less bookings are for the day they were made.
    pub fn display_status(&self, today: Date, time_zone: &jiff::tz::TimeZone) -> DisplayStatus {
        if self.status == AppointmentStatus::Cancelled {
            return DisplayStatus::Cancelled;
        }
        let day = self
            .appointment_date
            .unwrap_or_else(|| self.created_at.to_zoned(time_zone.clone()).date());
        if day < today {
            DisplayStatus::Completed
        } else {
            DisplayStatus::Scheduled
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewAppointment {
    pub reference_number: String,
    pub student_number: StudentNumber,
    pub appointment_type: AppointmentType,
    pub appointment_for: String,
    pub appointment_date: Option<Date>,
    pub appointment_time: Time,
    pub previous_appointment_ref: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppointmentChanges {
    pub appointment_date: Date,
    pub appointment_time: Time,
    pub appointment_for: String,
    pub status: AppointmentStatus,
}

/// The two orderings of a student's booking history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppointmentOrder {
    NewestCreated,
    LatestScheduled,
}

/// Treats absent and blank request values alike.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Fails with every absent field named at once.
pub fn require_fields(fields: &[(&str, bool)]) -> Result<(), Error> {
    let missing = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| name)
        .join(", ");
    if missing.is_empty() {
        Ok(())
    } else {
        tracing::debug!(%missing, "rejected incomplete request");
        Err(Error::Validation(format!("Missing required fields: {missing}")))
    }
}

pub fn parse_date(field: &str, value: &str) -> Result<Date, Error> {
    value
        .trim()
        .parse::<Date>()
        .map_err(|_| Error::Validation(format!("{field} must be a date in YYYY-MM-DD form")))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_clock_time(field: &str, value: &str) -> Result<Time, Error> {
    let invalid = || Error::Validation(format!("{field} must be a time in HH:MM form"));
    let mut parts = value.trim().split(':');
    let mut next = |required: bool| -> Result<i8, Error> {
        match parts.next() {
            Some(part) if (1..=2).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit()) => {
                part.parse().map_err(|_| invalid())
            }
            None if !required => Ok(0),
            _ => Err(invalid()),
        }
    };
    let (hour, minute, second) = (next(true)?, next(true)?, next(false)?);
    if parts.next().is_some() {
        return Err(invalid());
    }
    Time::new(hour, minute, second, 0).map_err(|_| invalid())
}

/// Serde adapter writing clock times as `HH:MM` and reading `HH:MM` or `HH:MM:SS`.
pub mod clock_time {
    use jiff::civil::Time;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.strftime("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_clock_time("time", &raw).map_err(serde::de::Error::custom)
    }
}
