use diesel::prelude::*;
use diesel_async::{
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{
        mobc::{Builder, Pool},
        AsyncDieselConnectionManager,
    },
    scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;

pub mod models;
mod schema;
mod sql_functions;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_SCHEDULED: &str = "scheduled";
pub const STATUS_CANCELLED: &str = "cancelled";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("getting connection from pool: {0}")]
    GetConnectionPool(#[from] mobc::Error<diesel_async::pooled_connection::PoolError>),
    #[error("establishing connection: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("result failure: {0}")]
    Result(diesel::result::Error),
    #[error("running migrations: {0}")]
    Migration(String),
    #[error("duplicate value violates {0}")]
    Duplicate(String),
    #[error("table does not exist: {0}")]
    TableMissing(String),
    #[error("row is no longer the latest")]
    Stale,
    #[error("Not Found")]
    NotFound,
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match err {
            DieselError::NotFound => Error::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Error::Duplicate(info.constraint_name().unwrap_or("unique constraint").to_owned())
            }
            DieselError::DatabaseError(_, ref info)
                if info.message().starts_with("relation ")
                    && info.message().ends_with("does not exist") =>
            {
                Error::TableMissing(info.message().to_owned())
            }
            err => Error::Result(err),
        }
    }
}

impl Error {
    /// True when the failure is transient infrastructure trouble and the operation may be retried.
    pub fn is_unavailable(&self) -> bool {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match self {
            Error::GetConnectionPool(_) | Error::Connection(_) => true,
            Error::Result(DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)) => {
                true
            }
            Error::Result(DieselError::BrokenTransactionManager) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: Pool<AsyncPgConnection>,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    db_url: String,
    max_open: u64,
    max_idle: u64,
    #[serde(with = "humantime_serde", default)]
    max_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    max_idle_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde")]
    timeout_for_get: Duration,
}

impl Config {
    pub fn set_db_url(&mut self, db_url: String) {
        self.db_url = db_url;
    }
}

/// Applies any pending migrations, then builds the connection pool.
pub async fn create(config: &Config) -> Result<Store, Error> {
    run_migrations(&config.db_url).await?;
    let pool = create_pool(config);
    Ok(Store { pool })
}

#[tracing::instrument(skip(db_url))]
async fn run_migrations(db_url: &str) -> Result<(), Error> {
    let db_url = db_url.to_owned();
    let applied = tokio::task::spawn_blocking(move || {
        let mut conn =
            <AsyncConnectionWrapper<AsyncPgConnection> as diesel::Connection>::establish(&db_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map(|versions| {
                versions
                    .iter()
                    .map(|version| version.to_string())
                    .collect::<Vec<_>>()
            })
            .map_err(|err| Error::Migration(err.to_string()))
    })
    .await
    .map_err(|err| Error::Migration(err.to_string()))??;
    if applied.is_empty() {
        tracing::info!("schema is up to date");
    } else {
        tracing::info!(?applied, "applied migrations");
    }
    Ok(())
}

fn create_pool(config: &Config) -> mobc::Pool<AsyncDieselConnectionManager<AsyncPgConnection>> {
    let builder = Builder::new()
        .max_open(config.max_open)
        .max_idle(config.max_idle)
        .max_lifetime(
            config
                .max_lifetime
                .map(|v| v.max(Duration::from_secs(3600))),
        )
        .max_idle_lifetime(
            config
                .max_idle_lifetime
                .map(|v| v.max(Duration::from_secs(900))),
        )
        .get_timeout(Some(config.timeout_for_get.max(Duration::from_secs(5))));
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.db_url);
    builder.build(manager)
}

impl Store {
    async fn connection(
        &self,
    ) -> Result<mobc::Connection<AsyncDieselConnectionManager<AsyncPgConnection>>, Error> {
        self.pool.get().await.map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_account_by_logon_name(
        &self,
        name: &str,
    ) -> Result<Option<models::Account>, Error> {
        use schema::chwc::account::dsl::*;
        use sql_functions::lower;
        let mut conn = self.connection().await?;
        match account
            .filter(lower(logon_name).eq(lower(name)))
            .select(models::Account::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_account_by_id(&self, account_id: i32) -> Result<Option<models::Account>, Error> {
        use schema::chwc::account::dsl::*;
        let mut conn = self.connection().await?;
        match account
            .filter(id.eq(account_id))
            .select(models::Account::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn onboarding_exists(&self, student: &str) -> Result<bool, Error> {
        use schema::chwc::onboarding::dsl::*;
        let mut conn = self.connection().await?;
        diesel::select(diesel::dsl::exists(
            onboarding.filter(student_number.eq(student)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(Into::into)
    }

    /// Inserts the single onboarding record of a student. A second record for the same
    /// student fails with [`Error::Duplicate`] from the unique constraint.
    #[tracing::instrument(skip(self, encrypted_details))]
    pub async fn insert_onboarding(
        &self,
        student: String,
        encrypted_details: Vec<u8>,
        completed_on: jiff::civil::Date,
    ) -> Result<models::Onboarding, Error> {
        use schema::chwc::onboarding;
        let now = jiff::Timestamp::now().into();
        let new_onboarding = models::NewOnboarding {
            student_number: student,
            encrypted_details,
            completed_on: completed_on.into(),
            created: now,
            updated: now,
        };
        let mut conn = self.connection().await?;
        diesel::insert_into(onboarding::table)
            .values(new_onboarding)
            .returning(models::Onboarding::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_onboarding(&self, student: &str) -> Result<Option<models::Onboarding>, Error> {
        use schema::chwc::onboarding::dsl::*;
        let mut conn = self.connection().await?;
        match onboarding
            .filter(student_number.eq(student))
            .select(models::Onboarding::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn latest_proof_submission(
        &self,
        student: &str,
    ) -> Result<Option<models::ProofSubmission>, Error> {
        use schema::chwc::proof_submission::dsl::*;
        let mut conn = self.connection().await?;
        match proof_submission
            .filter(student_number.eq(student))
            .order((uploaded_at.desc(), id.desc()))
            .select(models::ProofSubmission::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_proof_submissions(
        &self,
        student: &str,
    ) -> Result<Vec<models::ProofSubmission>, Error> {
        use schema::chwc::proof_submission::dsl::*;
        let mut conn = self.connection().await?;
        proof_submission
            .filter(student_number.eq(student))
            .order((uploaded_at.desc(), id.desc()))
            .select(models::ProofSubmission::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    /// Records a new upload as the latest, pending submission. Earlier rows are kept as history.
    #[tracing::instrument(skip(self))]
    pub async fn insert_proof_submission(
        &self,
        student: String,
        file_name: String,
        file_reference: String,
        file_size: i64,
        mimetype: String,
    ) -> Result<models::ProofSubmission, Error> {
        use schema::chwc::proof_submission;
        let now = jiff::Timestamp::now().into();
        let new_submission = models::NewProofSubmission {
            student_number: student,
            file_name,
            file_reference,
            file_size,
            mimetype,
            uploaded_at: now,
            approval_status: STATUS_PENDING.to_owned(),
            updated: now,
        };
        let mut conn = self.connection().await?;
        diesel::insert_into(proof_submission::table)
            .values(new_submission)
            .returning(models::ProofSubmission::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    /// Locks the latest submission of a student and records the decision on exactly that row.
    /// When `expected_id` is given and a newer upload has superseded it, nothing is written
    /// and [`Error::Stale`] is returned.
    #[tracing::instrument(skip(self))]
    pub async fn decide_latest_proof_submission(
        &self,
        student: &str,
        decision: &str,
        expected_id: Option<i32>,
    ) -> Result<models::ProofSubmission, Error> {
        let now: jiff_diesel::Timestamp = jiff::Timestamp::now().into();
        let student = student.to_owned();
        let decision = decision.to_owned();
        self.connection()
            .await?
            .transaction(move |conn| {
                use schema::chwc::proof_submission;
                async move {
                    let latest = proof_submission::table
                        .filter(proof_submission::student_number.eq(&student))
                        .order((
                            proof_submission::uploaded_at.desc(),
                            proof_submission::id.desc(),
                        ))
                        .select(models::ProofSubmission::as_select())
                        .for_update()
                        .first(conn)
                        .await?;
                    if expected_id.is_some_and(|expected| expected != latest.id) {
                        return Err(Error::Stale);
                    }
                    let approved_at = (decision == STATUS_APPROVED).then_some(now);
                    let decided = diesel::update(proof_submission::table.find(latest.id))
                        .set((
                            proof_submission::approval_status.eq(&decision),
                            proof_submission::approved_at.eq(approved_at),
                            proof_submission::updated.eq(now),
                        ))
                        .returning(models::ProofSubmission::as_returning())
                        .get_result(conn)
                        .await?;
                    Ok::<_, Error>(decided)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reference_number_exists(&self, reference: &str) -> Result<bool, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        diesel::select(diesel::dsl::exists(
            appointment.filter(reference_number.eq(reference)),
        ))
        .get_result(&mut conn)
        .await
        .map_err(Into::into)
    }

    /// Inserts a booking. A reference number that is already taken fails with
    /// [`Error::Duplicate`] from the unique constraint.
    #[tracing::instrument(skip(self, new_appointment), fields(reference = %new_appointment.reference_number))]
    pub async fn insert_appointment(
        &self,
        new_appointment: models::NewAppointment,
    ) -> Result<models::Appointment, Error> {
        use schema::chwc::appointment;
        let mut conn = self.connection().await?;
        diesel::insert_into(appointment::table)
            .values(new_appointment)
            .returning(models::Appointment::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_appointment(&self, appointment_id: i32) -> Result<Option<models::Appointment>, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        match appointment
            .filter(id.eq(appointment_id))
            .select(models::Appointment::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_appointment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<models::Appointment>, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        match appointment
            .filter(reference_number.eq(reference))
            .select(models::Appointment::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Applies `changes` only while the appointment is still scheduled. `None` means no
    /// scheduled row with that id exists.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update_scheduled_appointment(
        &self,
        appointment_id: i32,
        changes: models::AppointmentChanges,
    ) -> Result<Option<models::Appointment>, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        match diesel::update(
            appointment.filter(id.eq(appointment_id).and(status.eq(STATUS_SCHEDULED))),
        )
        .set(changes)
        .returning(models::Appointment::as_returning())
        .get_result(&mut conn)
        .await
        {
            Ok(updated) => Ok(Some(updated)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Moves a scheduled appointment to cancelled. Cancelling an already cancelled appointment
    /// leaves the row untouched and returns it as is.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_appointment(&self, appointment_id: i32) -> Result<models::Appointment, Error> {
        let now: jiff_diesel::Timestamp = jiff::Timestamp::now().into();
        self.connection()
            .await?
            .transaction(move |conn| {
                use schema::chwc::appointment::dsl::*;
                async move {
                    match diesel::update(
                        appointment.filter(id.eq(appointment_id).and(status.eq(STATUS_SCHEDULED))),
                    )
                    .set((status.eq(STATUS_CANCELLED), updated_at.eq(now)))
                    .returning(models::Appointment::as_returning())
                    .get_result(conn)
                    .await
                    {
                        Ok(cancelled) => Ok(cancelled),
                        Err(diesel::result::Error::NotFound) => appointment
                            .filter(id.eq(appointment_id))
                            .select(models::Appointment::as_select())
                            .first(conn)
                            .await
                            .map_err(Into::into),
                        Err(err) => Err::<_, Error>(err.into()),
                    }
                }
                .scope_boxed()
            })
            .await
    }

    /// A student's appointments, most recently created first.
    #[tracing::instrument(skip(self))]
    pub async fn list_appointments_for_student(
        &self,
        student: &str,
    ) -> Result<Vec<models::Appointment>, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        appointment
            .filter(student_number.eq(student))
            .order((created_at.desc(), id.desc()))
            .select(models::Appointment::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    /// A student's appointments by appointment date and time, latest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_appointments_for_student_by_date(
        &self,
        student: &str,
    ) -> Result<Vec<models::Appointment>, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        appointment
            .filter(student_number.eq(student))
            .order((
                appointment_date.desc().nulls_last(),
                appointment_time.desc(),
                id.desc(),
            ))
            .select(models::Appointment::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_appointments(&self) -> Result<Vec<models::Appointment>, Error> {
        use schema::chwc::appointment::dsl::*;
        let mut conn = self.connection().await?;
        appointment
            .order((
                appointment_date.desc().nulls_last(),
                appointment_time.desc(),
                id.desc(),
            ))
            .select(models::Appointment::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self, fields))]
    pub async fn insert_emergency_report(
        &self,
        fields: models::EmergencyReportFields,
    ) -> Result<models::EmergencyReport, Error> {
        use schema::chwc::emergency_report;
        let now: jiff_diesel::Timestamp = jiff::Timestamp::now().into();
        let mut conn = self.connection().await?;
        diesel::insert_into(emergency_report::table)
            .values((
                fields,
                emergency_report::created_at.eq(now),
                emergency_report::updated_at.eq(now),
            ))
            .returning(models::EmergencyReport::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_emergency_reports(
        &self,
    ) -> Result<Vec<models::EmergencyReportSummary>, Error> {
        use schema::chwc::emergency_report::dsl::*;
        let mut conn = self.connection().await?;
        emergency_report
            .order((created_at.desc(), id.desc()))
            .select(models::EmergencyReportSummary::as_select())
            .load(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_emergency_report(
        &self,
        report_id: i32,
    ) -> Result<Option<models::EmergencyReport>, Error> {
        use schema::chwc::emergency_report::dsl::*;
        let mut conn = self.connection().await?;
        match emergency_report
            .filter(id.eq(report_id))
            .select(models::EmergencyReport::as_select())
            .first(&mut conn)
            .await
        {
            Ok(loaded) => Ok(Some(loaded)),
            Err(diesel::result::Error::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, fields))]
    pub async fn update_emergency_report(
        &self,
        report_id: i32,
        fields: models::EmergencyReportFields,
    ) -> Result<models::EmergencyReport, Error> {
        use schema::chwc::emergency_report;
        let now: jiff_diesel::Timestamp = jiff::Timestamp::now().into();
        let mut conn = self.connection().await?;
        diesel::update(emergency_report::table.find(report_id))
            .set((fields, emergency_report::updated_at.eq(now)))
            .returning(models::EmergencyReport::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(Into::into)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_emergency_report(&self, report_id: i32) -> Result<(), Error> {
        use schema::chwc::emergency_report;
        let mut conn = self.connection().await?;
        match diesel::delete(emergency_report::table.find(report_id))
            .execute(&mut conn)
            .await
        {
            Ok(0) => Err(Error::NotFound),
            Ok(_) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
