use crate::{
    clinic::Clinic,
    domain::{Account, Caller, Role, StudentNumber},
    error::Error as ClinicError,
    store::StoreError,
};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{extract::rejection::JsonRejection, Json};
use axum_login::{AuthSession, AuthUser, AuthnBackend, UserId};
use rs_sha512::HasherContext;
use std::hash::Hasher;

#[derive(Clone, Debug)]
pub struct BackEnd {
    clinic: Clinic,
}

pub(crate) fn create_backend(clinic: Clinic) -> BackEnd {
    BackEnd { clinic }
}

#[derive(Clone, Debug)]
pub struct User {
    id: i32,
    role: Role,
    student_number: Option<StudentNumber>,
    session_auth_hash: [u8; 64],
}

impl User {
    pub fn caller(&self) -> Caller {
        Caller {
            role: self.role,
            student_number: self.student_number.clone(),
        }
    }
}

impl AuthUser for User {
    type Id = i32;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        &self.session_auth_hash
    }
}

/// Sessions are bound to the stored pass phrase hash, so changing it ends them.
impl From<Account> for User {
    fn from(account: Account) -> Self {
        let caller = account.caller();
        let mut hasher = rs_sha512::Sha512Hasher::default();
        hasher.write(account.pass_phrase.as_bytes());
        let session_auth_hash = HasherContext::finish(&mut hasher);
        Self {
            id: account.id,
            role: caller.role,
            student_number: caller.student_number,
            session_auth_hash: session_auth_hash.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Account store error: {0}")]
    AccountStore(#[from] StoreError),
    #[error("Stored pass phrase could not be parsed: {0}")]
    StoredPassPhraseUnableToParse(argon2::password_hash::Error),
}

#[derive(Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    logon_name: String,
    pass_phrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("logon_name", &self.logon_name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl AuthnBackend for BackEnd {
    type User = User;
    type Credentials = Credentials;
    type Error = Error;

    #[tracing::instrument(skip(self))]
    async fn authenticate(
        &self,
        credentials: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let Some(account) = self
            .clinic
            .within(
                self.clinic
                    .store()
                    .load_account_by_logon_name(&credentials.logon_name),
            )
            .await?
        else {
            tracing::info!("unknown logon name");
            return Ok(None);
        };
        let parsed_pass_phrase =
            PasswordHash::new(&account.pass_phrase).map_err(Error::StoredPassPhraseUnableToParse)?;
        if Argon2::default()
            .verify_password(credentials.pass_phrase.as_bytes(), &parsed_pass_phrase)
            .is_err()
        {
            tracing::info!("pass phrase mismatch");
            return Ok(None);
        }
        Ok(Some(account.into()))
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        Ok(self
            .clinic
            .within(self.clinic.store().load_account(*user_id))
            .await?
            .map(Into::into))
    }
}

/// The logged in caller of an API request.
pub fn caller(auth_session: &AuthSession<BackEnd>) -> Result<Caller, ClinicError> {
    auth_session
        .user
        .as_ref()
        .map(User::caller)
        .ok_or(ClinicError::Unauthorized)
}

pub mod login {
    use super::*;

    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LoggedIn {
        role: Role,
        student_number: Option<StudentNumber>,
    }

    pub async fn post(
        mut auth_session: AuthSession<BackEnd>,
        payload: Result<Json<Credentials>, JsonRejection>,
    ) -> Result<Json<LoggedIn>, ClinicError> {
        let Json(credentials) = payload?;
        let user = match auth_session.authenticate(credentials).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(ClinicError::Unauthorized),
            Err(err) => return Err(ClinicError::Internal(format!("authenticating: {err}"))),
        };
        auth_session
            .login(&user)
            .await
            .map_err(|err| ClinicError::Internal(format!("starting session: {err}")))?;
        Ok(Json(LoggedIn {
            role: user.role,
            student_number: user.student_number,
        }))
    }
}

pub mod logout {
    use super::*;

    #[derive(serde::Serialize)]
    pub struct LoggedOut {
        message: &'static str,
    }

    pub async fn post(
        mut auth_session: AuthSession<BackEnd>,
    ) -> Result<Json<LoggedOut>, ClinicError> {
        auth_session
            .logout()
            .await
            .map_err(|err| ClinicError::Internal(format!("ending session: {err}")))?;
        Ok(Json(LoggedOut {
            message: "Logged out",
        }))
    }
}

#[cfg(test)]
pub(crate) fn hash_pass_phrase(pass_phrase: &str) -> String {
    use argon2::{
        password_hash::{rand_core::OsRng, SaltString},
        Algorithm, Params, PasswordHasher, Version,
    };
    let params = Params::new(1024, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(pass_phrase.as_bytes(), &salt)
        .unwrap()
        .to_string()
}
