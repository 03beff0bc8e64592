//! Database connection pool utilities.

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use uuid::Uuid;

use crate::crypto::{BootstrapKey, hash_api_key};
use crate::models::NewApiKey;
use crate::schema::api_keys;

/// Pooled PostgreSQL connections for the ClaimDesk server.
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Embedded Diesel migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Initialize the database pool using `DATABASE_URL` and run migrations.
pub fn init_pool() -> Result<DbPool, String> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL must be set to a PostgreSQL connection string".to_string())?;
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .map_err(|err| format!("failed to create database pool: {err}"))?;
    run_migrations(&pool)?;
    Ok(pool)
}

/// Run pending Diesel migrations.
pub fn run_migrations(pool: &DbPool) -> Result<(), String> {
    let mut conn = pool
        .get()
        .map_err(|err| format!("failed to fetch database connection: {err}"))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| format!("run migrations: {err}"))?;
    Ok(())
}

/// Store bootstrap keys that are not present yet. Returns how many were added.
pub fn ensure_api_keys(conn: &mut PgConnection, keys: &[BootstrapKey]) -> Result<usize, String> {
    let now = Utc::now().naive_utc();
    let mut inserted = 0;
    for key in keys {
        let key_hash = hash_api_key(&key.key);
        let exists = api_keys::table
            .filter(api_keys::key_hash.eq(&key_hash))
            .count()
            .get_result::<i64>(conn)
            .map_err(|err| err.to_string())?
            > 0;
        if exists {
            continue;
        }
        let row = NewApiKey {
            id: Uuid::new_v4().to_string(),
            label: key.label.clone(),
            key_hash,
            created_at: now,
        };
        diesel::insert_into(api_keys::table)
            .values(&row)
            .execute(conn)
            .map_err(|err| err.to_string())?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Number of stored API keys.
pub fn count_api_keys(conn: &mut PgConnection) -> Result<i64, String> {
    api_keys::table
        .count()
        .get_result(conn)
        .map_err(|err| err.to_string())
}

#[cfg(test)]
fn split_database_url(database_url: &str) -> (String, String) {
    let (url_base, query) = database_url.split_once('?').unwrap_or((database_url, ""));
    let (base, _db_name) = url_base
        .rsplit_once('/')
        .expect("DATABASE_URL must include a database name");
    let query_suffix = if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    (base.to_string(), query_suffix)
}

#[cfg(test)]
/// A temporary PostgreSQL database for tests.
pub(crate) struct TestDatabase {
    database_url: String,
    admin_url: String,
    db_name: String,
    pool: Option<DbPool>,
}

#[cfg(test)]
impl TestDatabase {
    /// Create an isolated database from `TEST_DATABASE_URL` or `DATABASE_URL`.
    pub(crate) fn new() -> Self {
        let base_url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .expect("set TEST_DATABASE_URL or DATABASE_URL for PostgreSQL tests");
        let (base, query_suffix) = split_database_url(&base_url);
        let db_name = format!("claimdesk_test_{}", Uuid::new_v4().simple());
        let admin_url = format!("{}/postgres{}", base, query_suffix);
        let database_url = format!("{}/{}{}", base, db_name, query_suffix);

        let mut admin_conn = PgConnection::establish(&admin_url).expect("connect admin database");
        diesel::sql_query(format!("CREATE DATABASE \"{db_name}\""))
            .execute(&mut admin_conn)
            .expect("create test database");

        Self {
            database_url,
            admin_url,
            db_name,
            pool: None,
        }
    }

    /// Return the test database URL.
    pub(crate) fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Pooled connections for the test database (runs migrations once).
    pub(crate) fn pool(&mut self) -> DbPool {
        if self.pool.is_none() {
            let manager = ConnectionManager::<PgConnection>::new(self.database_url.clone());
            let pool = r2d2::Pool::builder()
                .max_size(2)
                .build(manager)
                .expect("pool");
            run_migrations(&pool).expect("migrations");
            self.pool = Some(pool);
        }
        self.pool.as_ref().expect("pool").clone()
    }
}

#[cfg(test)]
impl Drop for TestDatabase {
    fn drop(&mut self) {
        let _ = self.pool.take();
        if let Ok(mut conn) = PgConnection::establish(&self.admin_url) {
            let escaped = self.db_name.replace('\'', "''");
            let _ = diesel::sql_query(format!(
                "SELECT pg_terminate_backend(pid) \
                 FROM pg_stat_activity \
                 WHERE datname = '{escaped}' AND pid <> pg_backend_pid()"
            ))
            .execute(&mut conn);
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
                .execute(&mut conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::sql_types::Text;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_lock() -> MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock")
    }

    #[derive(QueryableByName)]
    struct TableName {
        #[diesel(sql_type = Text)]
        name: String,
    }

    #[test]
    fn split_database_url_keeps_query() {
        let (base, query) = split_database_url("postgres://u:p@localhost:5432/claims?sslmode=disable");
        assert_eq!(base, "postgres://u:p@localhost:5432");
        assert_eq!(query, "?sslmode=disable");
    }

    #[test]
    fn init_pool_requires_database_url() {
        let _guard = env_lock();
        let previous = std::env::var("DATABASE_URL").ok();
        unsafe {
            std::env::remove_var("DATABASE_URL");
        }
        let err = init_pool().unwrap_err();
        assert!(err.contains("DATABASE_URL"));
        if let Some(value) = previous {
            unsafe {
                std::env::set_var("DATABASE_URL", value);
            }
        }
    }

    #[test]
    fn init_pool_runs_migrations() {
        let _guard = env_lock();
        let test_db = TestDatabase::new();
        let previous = std::env::var("DATABASE_URL").ok();
        unsafe {
            std::env::set_var("DATABASE_URL", test_db.database_url());
        }
        let pool: DbPool = init_pool().expect("pool");

        let mut conn = pool.get().expect("conn");
        let tables: Vec<TableName> = diesel::sql_query(
            "SELECT tablename AS name FROM pg_tables WHERE schemaname = 'public' \
             AND tablename IN ('cases', 'shipment_audits') ORDER BY tablename",
        )
        .load(&mut conn)
        .expect("query tables");

        let names: Vec<&str> = tables.iter().map(|table| table.name.as_str()).collect();
        assert_eq!(names, vec!["cases", "shipment_audits"]);

        match previous {
            Some(value) => unsafe {
                std::env::set_var("DATABASE_URL", value);
            },
            None => unsafe {
                std::env::remove_var("DATABASE_URL");
            },
        }
    }

    #[test]
    fn ensure_api_keys_is_idempotent() {
        let mut test_db = TestDatabase::new();
        let pool = test_db.pool();
        let mut conn = pool.get().expect("conn");
        let keys = vec![BootstrapKey {
            label: "ops".to_string(),
            key: "key-1".to_string(),
        }];

        assert_eq!(ensure_api_keys(&mut conn, &keys).expect("insert"), 1);
        assert_eq!(ensure_api_keys(&mut conn, &keys).expect("insert"), 0);
        assert_eq!(count_api_keys(&mut conn).expect("count"), 1);
    }
}
