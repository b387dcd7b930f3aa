use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use keystone_shared::types::auth::OAuthProvider;

use crate::models::{IdentityLink, NewIdentityLink, NewUser, User, UserChanges};
use crate::schema::{admins, identity_links, users};

use super::{bounded, StoreError, UserStore};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Checkout waits no longer than `checkout_timeout` for a free connection.
pub fn connect(database_url: &str, max_size: u32, checkout_timeout: Duration) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .connection_timeout(checkout_timeout)
        .test_on_check_out(true)
        .build(manager)
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

pub struct PgUserStore {
    pool: DbPool,
    op_timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: DbPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Runs a diesel closure on the blocking pool with a pooled connection.
    /// The caller stops waiting after `op_timeout`; the query itself is not
    /// cancelled.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, DieselError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| StoreError::Unavailable(e.to_string()))?;
            f(&mut conn).map_err(StoreError::from)
        });
        bounded(self.op_timeout, async move {
            task.await.map_err(|e| StoreError::Unavailable(e.to_string()))?
        })
        .await
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_string();
        self.run(move |conn| {
            users::table
                .filter(users::email.eq(email))
                .select(User::as_select())
                .first(conn)
                .optional()
        })
        .await
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.run(move |conn| users::table.find(id).select(User::as_select()).first(conn).optional())
            .await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.run(move |conn| {
            diesel::insert_into(users::table)
                .values(&user)
                .returning(User::as_returning())
                .get_result(conn)
        })
        .await
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<(), StoreError> {
        if changes.name.is_none() && changes.avatar_url.is_none() {
            return Ok(());
        }
        self.run(move |conn| {
            diesel::update(users::table.find(id))
                .set((&changes, users::updated_at.eq(Utc::now())))
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let token = token.to_string();
        self.run(move |conn| {
            diesel::update(users::table.find(id))
                .set((
                    users::verification_token.eq(Some(token)),
                    users::verification_expires_at.eq(Some(expires_at)),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn set_reset_token(&self, id: i64, token: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        let token = token.to_string();
        self.run(move |conn| {
            diesel::update(users::table.find(id))
                .set((
                    users::reset_token.eq(Some(token)),
                    users::reset_expires_at.eq(Some(expires_at)),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let password_hash = password_hash.to_string();
        self.run(move |conn| {
            diesel::update(users::table.find(id))
                .set((
                    users::password_hash.eq(Some(password_hash)),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn mark_email_verified(&self, id: i64) -> Result<(), StoreError> {
        self.run(move |conn| {
            diesel::update(users::table.find(id))
                .set((users::email_verified.eq(true), users::updated_at.eq(Utc::now())))
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> Result<(), StoreError> {
        self.run(move |conn| {
            diesel::update(users::table.find(id))
                .set((users::is_blocked.eq(blocked), users::updated_at.eq(Utc::now())))
                .execute(conn)
                .map(|_| ())
        })
        .await
    }

    async fn verify_email(&self, token: &str, now: DateTime<Utc>) -> Result<Option<User>, StoreError> {
        let token = token.to_string();
        self.run(move |conn| {
            diesel::update(
                users::table
                    .filter(users::verification_token.eq(token))
                    .filter(users::verification_expires_at.gt(now)),
            )
            .set((
                users::email_verified.eq(true),
                users::verification_token.eq(None::<String>),
                users::verification_expires_at.eq(None::<DateTime<Utc>>),
                users::updated_at.eq(now),
            ))
            .returning(User::as_returning())
            .get_result(conn)
            .optional()
        })
        .await
    }

    async fn reset_password(
        &self,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let token = token.to_string();
        let password_hash = password_hash.to_string();
        self.run(move |conn| {
            diesel::update(
                users::table
                    .filter(users::reset_token.eq(token))
                    .filter(users::reset_expires_at.gt(now)),
            )
            .set((
                users::password_hash.eq(Some(password_hash)),
                users::reset_token.eq(None::<String>),
                users::reset_expires_at.eq(None::<DateTime<Utc>>),
                users::updated_at.eq(now),
            ))
            .returning(User::as_returning())
            .get_result(conn)
            .optional()
        })
        .await
    }

    async fn is_admin(&self, id: i64) -> Result<bool, StoreError> {
        self.run(move |conn| diesel::select(diesel::dsl::exists(admins::table.find(id))).get_result(conn))
            .await
    }

    async fn create_link(&self, link: NewIdentityLink) -> Result<IdentityLink, StoreError> {
        self.run(move |conn| {
            diesel::insert_into(identity_links::table)
                .values(&link)
                .returning(IdentityLink::as_returning())
                .get_result(conn)
        })
        .await
    }

    async fn get_link(
        &self,
        provider: OAuthProvider,
        external_id: &str,
    ) -> Result<Option<IdentityLink>, StoreError> {
        let external_id = external_id.to_string();
        self.run(move |conn| {
            identity_links::table
                .filter(identity_links::provider.eq(provider.as_str()))
                .filter(identity_links::external_id.eq(external_id))
                .select(IdentityLink::as_select())
                .first(conn)
                .optional()
        })
        .await
    }

    async fn get_links_by_user(&self, user_id: i64) -> Result<Vec<IdentityLink>, StoreError> {
        self.run(move |conn| {
            identity_links::table
                .filter(identity_links::user_id.eq(user_id))
                .order(identity_links::linked_at.asc())
                .select(IdentityLink::as_select())
                .load(conn)
        })
        .await
    }

    async fn delete_link(&self, user_id: i64, provider: OAuthProvider) -> Result<bool, StoreError> {
        self.run(move |conn| {
            diesel::delete(
                identity_links::table
                    .filter(identity_links::user_id.eq(user_id))
                    .filter(identity_links::provider.eq(provider.as_str())),
            )
            .execute(conn)
            .map(|n| n > 0)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.run(|conn| diesel::sql_query("SELECT 1").execute(conn).map(|_| ()))
            .await
    }
}
