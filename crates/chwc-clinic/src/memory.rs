//! An in-process [`ClinicStore`] with the same constraints as the Postgres schema.

use crate::{
    domain::{
        Account, Appointment, AppointmentChanges, AppointmentOrder, AppointmentStatus, Decision,
        NewAppointment, NewProof, OnboardingRecord, ProofSubmission, Role, StudentNumber,
        ApprovalStatus,
    },
    emergency::{EmergencyReport, EmergencyReportSummary, StoredEmergencyReport},
    store::{ClinicStore, StoreError},
};
use async_trait::async_trait;
use jiff::civil::Date;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: Vec<Account>,
    onboarding: Vec<OnboardingRecord>,
    proofs: Vec<ProofSubmission>,
    appointments: Vec<Appointment>,
    references: HashSet<String>,
    reports: Vec<StoredEmergencyReport>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    appointments_table_missing: AtomicBool,
    references_hidden: AtomicBool,
}

impl MemoryStore {
    pub fn add_account(
        &self,
        logon_name: &str,
        pass_phrase_hash: &str,
        role: Role,
        student_number: Option<StudentNumber>,
    ) -> i32 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        tables.accounts.push(Account {
            id,
            logon_name: logon_name.to_owned(),
            pass_phrase: pass_phrase_hash.to_owned(),
            role,
            student_number,
        });
        id
    }

    /// Makes every following call fail as if the database had gone away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn drop_appointments_table(&self) {
        self.appointments_table_missing.store(true, Ordering::SeqCst);
    }

    /// Makes the reference lookup miss, so only the unique key catches reuse.
    pub fn hide_references(&self) {
        self.references_hidden.store(true, Ordering::SeqCst);
    }

    pub fn appointment_count(&self) -> usize {
        self.tables.lock().unwrap().appointments.len()
    }

    pub fn proof_count(&self, student: &StudentNumber) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .proofs
            .iter()
            .filter(|p| &p.student_number == student)
            .count()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::TimedOut(Duration::from_secs(5)))
        } else {
            Ok(())
        }
    }

    fn check_appointments(&self) -> Result<(), StoreError> {
        self.check()?;
        if self.appointments_table_missing.load(Ordering::SeqCst) {
            Err(chwc_db::Error::TableMissing("relation \"chwc.appointment\" does not exist".into()).into())
        } else {
            Ok(())
        }
    }
}

fn latest<'a>(proofs: &'a mut [ProofSubmission], student: &StudentNumber) -> Option<&'a mut ProofSubmission> {
    proofs
        .iter_mut()
        .filter(|p| &p.student_number == student)
        .max_by_key(|p| (p.uploaded_at, p.id))
}

#[async_trait]
impl ClinicStore for MemoryStore {
    async fn load_account_by_logon_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .accounts
            .iter()
            .find(|a| a.logon_name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn load_account(&self, id: i32) -> Result<Option<Account>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn onboarding_exists(&self, student: &StudentNumber) -> Result<bool, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.onboarding.iter().any(|o| &o.student_number == student))
    }

    async fn insert_onboarding(
        &self,
        student: &StudentNumber,
        encrypted_details: Vec<u8>,
        completed_on: Date,
    ) -> Result<OnboardingRecord, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        if tables.onboarding.iter().any(|o| &o.student_number == student) {
            return Err(chwc_db::Error::Duplicate("onboarding_student_number_key".into()).into());
        }
        let record = OnboardingRecord {
            student_number: student.clone(),
            encrypted_details,
            completed_on,
        };
        tables.onboarding.push(record.clone());
        Ok(record)
    }

    async fn load_onboarding(
        &self,
        student: &StudentNumber,
    ) -> Result<Option<OnboardingRecord>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .onboarding
            .iter()
            .find(|o| &o.student_number == student)
            .cloned())
    }

    async fn latest_proof(
        &self,
        student: &StudentNumber,
    ) -> Result<Option<ProofSubmission>, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        Ok(latest(&mut tables.proofs, student).map(|p| p.clone()))
    }

    async fn list_proofs(&self, student: &StudentNumber) -> Result<Vec<ProofSubmission>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let mut proofs: Vec<_> = tables
            .proofs
            .iter()
            .filter(|p| &p.student_number == student)
            .cloned()
            .collect();
        proofs.sort_by_key(|p| std::cmp::Reverse((p.uploaded_at, p.id)));
        Ok(proofs)
    }

    async fn insert_proof(&self, proof: NewProof) -> Result<ProofSubmission, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let submission = ProofSubmission {
            id: tables.next_id(),
            student_number: proof.student_number,
            file_name: proof.file_name,
            file_reference: proof.file_reference,
            file_size: proof.file_size,
            mimetype: proof.mimetype,
            uploaded_at: jiff::Timestamp::now(),
            approval_status: ApprovalStatus::Pending,
            approved_at: None,
        };
        tables.proofs.push(submission.clone());
        Ok(submission)
    }

    async fn decide_latest_proof(
        &self,
        student: &StudentNumber,
        decision: Decision,
        expected_id: Option<i32>,
    ) -> Result<ProofSubmission, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let latest = latest(&mut tables.proofs, student).ok_or(chwc_db::Error::NotFound)?;
        if expected_id.is_some_and(|expected| expected != latest.id) {
            return Err(chwc_db::Error::Stale.into());
        }
        latest.approval_status = decision.status();
        latest.approved_at = (decision == Decision::Approved).then(jiff::Timestamp::now);
        Ok(latest.clone())
    }

    async fn reference_number_exists(&self, reference: &str) -> Result<bool, StoreError> {
        self.check()?;
        if self.references_hidden.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.tables.lock().unwrap().references.contains(reference))
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
    ) -> Result<Appointment, StoreError> {
        self.check_appointments()?;
        let mut tables = self.tables.lock().unwrap();
        if !tables.references.insert(appointment.reference_number.clone()) {
            return Err(
                chwc_db::Error::Duplicate("appointment_reference_number_key".into()).into(),
            );
        }
        let now = jiff::Timestamp::now();
        let stored = Appointment {
            id: tables.next_id(),
            reference_number: appointment.reference_number,
            student_number: appointment.student_number,
            appointment_type: appointment.appointment_type,
            appointment_for: appointment.appointment_for,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            previous_appointment_ref: appointment.previous_appointment_ref,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };
        tables.appointments.push(stored.clone());
        Ok(stored)
    }

    async fn load_appointment(&self, id: i32) -> Result<Option<Appointment>, StoreError> {
        self.check_appointments()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.appointments.iter().find(|a| a.id == id).cloned())
    }

    async fn load_appointment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Appointment>, StoreError> {
        self.check_appointments()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .appointments
            .iter()
            .find(|a| a.reference_number == reference)
            .cloned())
    }

    async fn update_scheduled_appointment(
        &self,
        id: i32,
        changes: AppointmentChanges,
    ) -> Result<Option<Appointment>, StoreError> {
        self.check_appointments()?;
        let mut tables = self.tables.lock().unwrap();
        let Some(appointment) = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == id && a.status == AppointmentStatus::Scheduled)
        else {
            return Ok(None);
        };
        appointment.appointment_date = Some(changes.appointment_date);
        appointment.appointment_time = changes.appointment_time;
        appointment.appointment_for = changes.appointment_for;
        appointment.status = changes.status;
        appointment.updated_at = jiff::Timestamp::now();
        Ok(Some(appointment.clone()))
    }

    async fn cancel_appointment(&self, id: i32) -> Result<Appointment, StoreError> {
        self.check_appointments()?;
        let mut tables = self.tables.lock().unwrap();
        let appointment = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(chwc_db::Error::NotFound)?;
        if appointment.status == AppointmentStatus::Scheduled {
            appointment.status = AppointmentStatus::Cancelled;
            appointment.updated_at = jiff::Timestamp::now();
        }
        Ok(appointment.clone())
    }

    async fn list_appointments_for_student(
        &self,
        student: &StudentNumber,
        order: AppointmentOrder,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.check_appointments()?;
        let tables = self.tables.lock().unwrap();
        let mut appointments: Vec<_> = tables
            .appointments
            .iter()
            .filter(|a| &a.student_number == student)
            .cloned()
            .collect();
        match order {
            AppointmentOrder::NewestCreated => {
                appointments.sort_by_key(|a| std::cmp::Reverse((a.created_at, a.id)))
            }
            AppointmentOrder::LatestScheduled => sort_by_schedule(&mut appointments),
        }
        Ok(appointments)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        self.check_appointments()?;
        let mut appointments = self.tables.lock().unwrap().appointments.clone();
        sort_by_schedule(&mut appointments);
        Ok(appointments)
    }

    async fn insert_emergency_report(
        &self,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let now = jiff::Timestamp::now();
        let stored = StoredEmergencyReport {
            id: tables.next_id(),
            report,
            created_at: now,
            updated_at: now,
        };
        tables.reports.push(stored.clone());
        Ok(stored)
    }

    async fn list_emergency_reports(&self) -> Result<Vec<EmergencyReportSummary>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .reports
            .iter()
            .rev()
            .map(EmergencyReportSummary::from)
            .collect())
    }

    async fn load_emergency_report(
        &self,
        id: i32,
    ) -> Result<Option<StoredEmergencyReport>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.reports.iter().find(|r| r.id == id).cloned())
    }

    async fn update_emergency_report(
        &self,
        id: i32,
        report: EmergencyReport,
    ) -> Result<StoredEmergencyReport, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables
            .reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(chwc_db::Error::NotFound)?;
        stored.report = report;
        stored.updated_at = jiff::Timestamp::now();
        Ok(stored.clone())
    }

    async fn delete_emergency_report(&self, id: i32) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let before = tables.reports.len();
        tables.reports.retain(|r| r.id != id);
        if tables.reports.len() == before {
            return Err(chwc_db::Error::NotFound.into());
        }
        Ok(())
    }
}

/// Date descending with date-less bookings last, then time descending.
fn sort_by_schedule(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        match (a.appointment_date, b.appointment_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then(b.appointment_time.cmp(&a.appointment_time))
        .then(b.id.cmp(&a.id))
    });
}

pub fn test_clinic() -> (crate::clinic::Clinic, std::sync::Arc<MemoryStore>) {
    let store = std::sync::Arc::new(MemoryStore::default());
    let clinic = crate::clinic::Clinic::new(store.clone(), Duration::from_secs(5));
    (clinic, store)
}
