//! Booking, modifying and cancelling appointments.

use crate::{
    clinic::Clinic,
    domain::{
        non_blank, parse_clock_time, parse_date, require_fields, Appointment, AppointmentChanges,
        AppointmentOrder, AppointmentStatus, AppointmentType, Caller, DisplayStatus,
        NewAppointment, StudentNumber,
    },
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

pub const REFERENCE_PREFIX: &str = "CHWCS";
pub const MAX_REFERENCE_ATTEMPTS: usize = 8;

/// `CHWCS` followed by ten random digits.
pub fn random_reference() -> String {
    format!(
        "{REFERENCE_PREFIX}{:010}",
        rand::random_range(0..10_000_000_000u64)
    )
}

/// A booking as submitted by the client. A `referenceNumber` sent along is ignored.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppointmentRequest {
    pub student_number: Option<String>,
    pub appointment_type: Option<String>,
    pub appointment_for: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub previous_appointment_ref: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppointmentUpdate {
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub appointment_for: Option<String>,
    pub status: Option<String>,
}

/// An appointment with its status as a reader sees it today.
#[derive(Debug, serde::Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub display_status: DisplayStatus,
}

impl AppointmentView {
    pub fn new(appointment: Appointment, now: &jiff::Zoned) -> Self {
        let display_status = appointment.display_status(now.date(), now.time_zone());
        Self {
            appointment,
            display_status,
        }
    }

    fn all(appointments: Vec<Appointment>) -> Vec<Self> {
        let now = jiff::Zoned::now();
        appointments
            .into_iter()
            .map(|appointment| Self::new(appointment, &now))
            .collect()
    }
}

/// Listings treat a missing table as "nothing booked yet".
fn or_empty<T>(listed: Result<Vec<T>, StoreError>) -> Result<Vec<T>, Error> {
    match listed {
        Err(err) if err.is_table_missing() => {
            tracing::warn!(%err, "appointment table missing, listing nothing");
            Ok(Vec::new())
        }
        listed => Ok(listed?),
    }
}

impl Clinic {
    pub async fn create_appointment(
        &self,
        caller: &Caller,
        request: AppointmentRequest,
    ) -> Result<Appointment, Error> {
        self.book(caller, request, random_reference).await
    }

    #[tracing::instrument(skip(self, caller, next_reference))]
    async fn book(
        &self,
        caller: &Caller,
        request: AppointmentRequest,
        mut next_reference: impl FnMut() -> String + Send,
    ) -> Result<Appointment, Error> {
        let student = StudentNumber::required(request.student_number.as_deref())?;
        caller.ensure_may_act_for(&student)?;

        let appointment_type = non_blank(request.appointment_type.as_deref());
        let appointment_for = non_blank(request.appointment_for.as_deref());
        let appointment_date = non_blank(request.appointment_date.as_deref());
        let appointment_time = non_blank(request.appointment_time.as_deref());
        let previous_ref = non_blank(request.previous_appointment_ref.as_deref());
        require_fields(&[
            ("appointmentType", appointment_type.is_some()),
            ("appointmentFor", appointment_for.is_some()),
            ("appointmentTime", appointment_time.is_some()),
        ])?;
        let (Some(appointment_type), Some(appointment_for), Some(appointment_time)) =
            (appointment_type, appointment_for, appointment_time)
        else {
            return Err(Error::Validation("Missing required fields".into()));
        };
        let appointment_type = AppointmentType::from_label(appointment_type).ok_or_else(|| {
            Error::Validation(format!("Unknown appointment type {appointment_type:?}"))
        })?;
        let is_follow_up = appointment_type == AppointmentType::FollowUp;
        require_fields(&[
            (
                "appointmentDate",
                appointment_date.is_some() || !appointment_type.requires_date(appointment_for),
            ),
            ("previousAppointmentRef", previous_ref.is_some() || !is_follow_up),
        ])?;
        let appointment_date = appointment_date
            .map(|date| parse_date("appointmentDate", date))
            .transpose()?;
        let appointment_time = parse_clock_time("appointmentTime", appointment_time)?;

        if !self.can_book(&student).await? {
            tracing::info!(%student, "booking refused, proof of registration not approved");
            return Err(Error::NotEligible);
        }

        let previous_appointment_ref = match previous_ref.filter(|_| is_follow_up) {
            Some(reference) => {
                let previous = self
                    .within(self.store().load_appointment_by_reference(reference))
                    .await?;
                if !previous.is_some_and(|previous| previous.student_number == student) {
                    return Err(Error::Validation(format!(
                        "Previous appointment {reference} is not one of this student's appointments"
                    )));
                }
                Some(reference.to_owned())
            }
            None => None,
        };

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference_number = next_reference();
            if self
                .within(self.store().reference_number_exists(&reference_number))
                .await?
            {
                tracing::debug!(attempt, %reference_number, "reference number taken");
                continue;
            }
            let new_appointment = NewAppointment {
                reference_number,
                student_number: student.clone(),
                appointment_type,
                appointment_for: appointment_for.to_owned(),
                appointment_date,
                appointment_time,
                previous_appointment_ref: previous_appointment_ref.clone(),
            };
            match self
                .within(self.store().insert_appointment(new_appointment))
                .await
            {
                Ok(appointment) => {
                    tracing::info!(
                        id = appointment.id,
                        reference = %appointment.reference_number,
                        "appointment booked"
                    );
                    return Ok(appointment);
                }
                Err(err) if err.is_duplicate() => {
                    tracing::debug!(attempt, "reference number taken concurrently");
                }
                Err(err) => return Err(err.into()),
            }
        }
        tracing::error!(
            attempts = MAX_REFERENCE_ATTEMPTS,
            "no unused appointment reference number found"
        );
        Err(Error::ReferenceCollisionExhausted {
            attempts: MAX_REFERENCE_ATTEMPTS,
        })
    }

    /// Changes date, time and service of a scheduled appointment.
    #[tracing::instrument(skip(self, caller))]
    pub async fn update_appointment(
        &self,
        caller: &Caller,
        id: i32,
        update: AppointmentUpdate,
    ) -> Result<Appointment, Error> {
        let appointment_date = non_blank(update.appointment_date.as_deref());
        let appointment_time = non_blank(update.appointment_time.as_deref());
        let appointment_for = non_blank(update.appointment_for.as_deref());
        require_fields(&[
            ("appointmentDate", appointment_date.is_some()),
            ("appointmentTime", appointment_time.is_some()),
            ("appointmentFor", appointment_for.is_some()),
        ])?;
        let (Some(appointment_date), Some(appointment_time), Some(appointment_for)) =
            (appointment_date, appointment_time, appointment_for)
        else {
            return Err(Error::Validation("Missing required fields".into()));
        };
        let appointment_date = parse_date("appointmentDate", appointment_date)?;
        let appointment_time = parse_clock_time("appointmentTime", appointment_time)?;
        let status = non_blank(update.status.as_deref())
            .map(AppointmentStatus::parse)
            .transpose()?;

        let current = self
            .within(self.store().load_appointment(id))
            .await?
            .ok_or_else(|| Error::NotFound("Appointment not found".into()))?;
        caller.ensure_may_act_for(&current.student_number)?;
        if current.status == AppointmentStatus::Cancelled {
            return Err(Error::AppointmentCancelled);
        }
        let changes = AppointmentChanges {
            appointment_date,
            appointment_time,
            appointment_for: appointment_for.to_owned(),
            status: status.unwrap_or(current.status),
        };
        match self
            .within(self.store().update_scheduled_appointment(id, changes))
            .await?
        {
            Some(updated) => Ok(updated),
            // Cancelled between the read and the write.
            None => Err(Error::AppointmentCancelled),
        }
    }

    /// Cancelling twice is not an error.
    #[tracing::instrument(skip(self, caller))]
    pub async fn cancel_appointment(&self, caller: &Caller, id: i32) -> Result<Appointment, Error> {
        let current = self
            .within(self.store().load_appointment(id))
            .await?
            .ok_or_else(|| Error::NotFound("Appointment not found".into()))?;
        caller.ensure_may_act_for(&current.student_number)?;
        let cancelled = self.within(self.store().cancel_appointment(id)).await?;
        tracing::info!(id, reference = %cancelled.reference_number, "appointment cancelled");
        Ok(cancelled)
    }

    /// Most recently created first.
    pub async fn list_for_student(
        &self,
        caller: &Caller,
        student: &StudentNumber,
    ) -> Result<Vec<Appointment>, Error> {
        caller.ensure_may_act_for(student)?;
        or_empty(
            self.within(
                self.store()
                    .list_appointments_for_student(student, AppointmentOrder::NewestCreated),
            )
            .await,
        )
    }

    /// Latest appointment date first; date-less bookings last.
    pub async fn list_for_student_by_date(
        &self,
        caller: &Caller,
        student: &StudentNumber,
    ) -> Result<Vec<Appointment>, Error> {
        caller.ensure_may_act_for(student)?;
        or_empty(
            self.within(
                self.store()
                    .list_appointments_for_student(student, AppointmentOrder::LatestScheduled),
            )
            .await,
        )
    }

    pub async fn list_all(&self, caller: &Caller) -> Result<Vec<Appointment>, Error> {
        caller.ensure_staff()?;
        or_empty(self.within(self.store().list_appointments()).await)
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Saved {
    message: &'static str,
    appointment_id: i32,
    reference_number: String,
}

#[derive(Debug, serde::Serialize)]
pub struct Changed {
    message: &'static str,
    appointment: AppointmentView,
}

pub mod save_appointment {
    use super::*;

    pub async fn post(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        payload: Result<Json<AppointmentRequest>, JsonRejection>,
    ) -> Result<Json<Saved>, Error> {
        let caller = caller(&auth_session)?;
        let Json(request) = payload?;
        let appointment = app_state.clinic.create_appointment(&caller, request).await?;
        Ok(Json(Saved {
            message: "Appointment saved successfully",
            appointment_id: appointment.id,
            reference_number: appointment.reference_number,
        }))
    }
}

pub mod student_appointments {
    use super::*;

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(student_number): Path<String>,
    ) -> Result<Json<Vec<AppointmentView>>, Error> {
        let caller = caller(&auth_session)?;
        let student = StudentNumber::parse(&student_number)?;
        let appointments = app_state.clinic.list_for_student(&caller, &student).await?;
        Ok(Json(AppointmentView::all(appointments)))
    }
}

pub mod student_appointments_by_date {
    use super::*;

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(student_number): Path<String>,
    ) -> Result<Json<Vec<AppointmentView>>, Error> {
        let caller = caller(&auth_session)?;
        let student = StudentNumber::parse(&student_number)?;
        let appointments = app_state
            .clinic
            .list_for_student_by_date(&caller, &student)
            .await?;
        Ok(Json(AppointmentView::all(appointments)))
    }
}

pub mod all_appointments {
    use super::*;

    pub async fn get(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
    ) -> Result<Json<Vec<AppointmentView>>, Error> {
        let caller = caller(&auth_session)?;
        let appointments = app_state.clinic.list_all(&caller).await?;
        Ok(Json(AppointmentView::all(appointments)))
    }
}

pub mod update_appointment {
    use super::*;

    pub async fn put(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(id): Path<i32>,
        payload: Result<Json<AppointmentUpdate>, JsonRejection>,
    ) -> Result<Json<Changed>, Error> {
        let caller = caller(&auth_session)?;
        let Json(update) = payload?;
        let updated = app_state
            .clinic
            .update_appointment(&caller, id, update)
            .await?;
        Ok(Json(Changed {
            message: "Appointment updated successfully",
            appointment: AppointmentView::new(updated, &jiff::Zoned::now()),
        }))
    }
}

pub mod cancel_appointment {
    use super::*;

    pub async fn put(
        auth_session: AuthSession<BackEnd>,
        State(app_state): State<AppState>,
        Path(id): Path<i32>,
    ) -> Result<Json<Changed>, Error> {
        let caller = caller(&auth_session)?;
        let cancelled = app_state.clinic.cancel_appointment(&caller, id).await?;
        Ok(Json(Changed {
            message: "Appointment cancelled successfully",
            appointment: AppointmentView::new(cancelled, &jiff::Zoned::now()),
        }))
    }
}
