use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{query::Query, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::model::{
    DepartmentStats, NewSalary, SalaryFilter, SalaryRecord, SalaryStats, SubDepartmentStats,
};

/// Thread-safe handle to the salaries database. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("open sqlite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an ephemeral in-memory database. A single connection keeps the
    /// database alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("open in-memory sqlite database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Idempotent schema setup. AUTOINCREMENT keeps deleted identifiers
    /// from ever being handed out again.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS salaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                salary REAL NOT NULL,
                currency TEXT NOT NULL,
                on_contract INTEGER NOT NULL DEFAULT 0,
                department TEXT NOT NULL,
                sub_department TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("create salaries table")?;
        Ok(())
    }

    /// Insert a salary record, coercing `on_contract` to 0/1 on bind.
    /// Returns the record annotated with the assigned identifier. Assumes
    /// caller-validated input.
    pub async fn insert(&self, record: NewSalary) -> Result<SalaryRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO salaries (name, salary, currency, on_contract, department, sub_department)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.name)
        .bind(record.salary)
        .bind(&record.currency)
        .bind(if record.on_contract { 1i64 } else { 0 })
        .bind(&record.department)
        .bind(&record.sub_department)
        .execute(&self.pool)
        .await
        .context("insert salary record")?;

        let id = result.last_insert_rowid();
        debug!(id, "inserted salary record");
        Ok(record.into_record(id))
    }

    /// Delete the row matching `id`. Returns true iff at least one row was
    /// removed; a nonexistent id is not an error.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM salaries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete salary record")?;
        Ok(result.rows_affected() > 0)
    }

    /// All salary records with identifiers attached. Insertion order is not
    /// guaranteed.
    pub async fn list(&self) -> Result<Vec<SalaryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, salary, currency, on_contract, department, sub_department
            FROM salaries
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("list salary records")?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// `{avg, max, min}` of `salary` over records matching `filter`. With no
    /// filter fields set the aggregate covers the whole table; over an empty
    /// matching set every aggregate is NULL.
    pub async fn stats(&self, filter: &SalaryFilter) -> Result<SalaryStats> {
        let sql = format!(
            "SELECT AVG(salary) AS avg, MAX(salary) AS max, MIN(salary) AS min FROM salaries{}",
            where_clause(filter)
        );
        let row = bind_filter(sqlx::query(&sql), filter)
            .fetch_one(&self.pool)
            .await
            .context("query salary statistics")?;

        Ok(SalaryStats {
            avg: row.get("avg"),
            max: row.get("max"),
            min: row.get("min"),
        })
    }

    /// Same aggregation, one row per distinct `department` value present in
    /// the matching record set.
    pub async fn stats_by_department(&self, filter: &SalaryFilter) -> Result<Vec<DepartmentStats>> {
        let sql = format!(
            "SELECT department, AVG(salary) AS avg, MAX(salary) AS max, MIN(salary) AS min \
             FROM salaries{} GROUP BY department",
            where_clause(filter)
        );
        let rows = bind_filter(sqlx::query(&sql), filter)
            .fetch_all(&self.pool)
            .await
            .context("query salary statistics by department")?;

        Ok(rows
            .iter()
            .map(|row| DepartmentStats {
                department: row.get("department"),
                avg: row.get("avg"),
                max: row.get("max"),
                min: row.get("min"),
            })
            .collect())
    }

    /// Same aggregation, one row per distinct `(department, sub_department)`
    /// pair in the matching record set.
    pub async fn stats_by_department_and_sub_department(
        &self,
        filter: &SalaryFilter,
    ) -> Result<Vec<SubDepartmentStats>> {
        let sql = format!(
            "SELECT department, sub_department, AVG(salary) AS avg, MAX(salary) AS max, \
             MIN(salary) AS min FROM salaries{} GROUP BY department, sub_department",
            where_clause(filter)
        );
        let rows = bind_filter(sqlx::query(&sql), filter)
            .fetch_all(&self.pool)
            .await
            .context("query salary statistics by department and sub-department")?;

        Ok(rows
            .iter()
            .map(|row| SubDepartmentStats {
                department: row.get("department"),
                sub_department: row.get("sub_department"),
                avg: row.get("avg"),
                max: row.get("max"),
                min: row.get("min"),
            })
            .collect())
    }
}

/// Compose the filter into a WHERE clause: equality only, conjunction when
/// both fields are set, nothing at all when neither is.
fn where_clause(filter: &SalaryFilter) -> String {
    let mut conditions = Vec::new();
    if filter.currency.is_some() {
        conditions.push("currency = ?");
    }
    if filter.on_contract.is_some() {
        conditions.push("on_contract = ?");
    }
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Bind filter parameters in the same order `where_clause` emits them.
fn bind_filter<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    filter: &SalaryFilter,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = query;
    if let Some(currency) = &filter.currency {
        query = query.bind(currency.clone());
    }
    if let Some(on_contract) = filter.on_contract {
        query = query.bind(if on_contract { 1i64 } else { 0 });
    }
    query
}

fn record_from_row(row: &SqliteRow) -> SalaryRecord {
    SalaryRecord {
        id: row.get("id"),
        name: row.get("name"),
        salary: row.get("salary"),
        currency: row.get("currency"),
        on_contract: row.get::<i64, _>("on_contract") != 0,
        department: row.get("department"),
        sub_department: row.get("sub_department"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    fn salary(name: &str, amount: f64, department: &str, sub_department: &str) -> NewSalary {
        NewSalary {
            name: name.into(),
            salary: amount,
            currency: "USD".into(),
            on_contract: false,
            department: department.into(),
            sub_department: sub_department.into(),
        }
    }

    #[tokio::test]
    async fn insert_returns_record_with_id() {
        let store = make_store().await;
        let input = NewSalary {
            on_contract: true,
            ..salary("Amala", 120000.0, "Engineering", "Platform")
        };

        let record = store.insert(input.clone()).await.unwrap();
        assert!(record.id >= 1);
        assert_eq!(record.name, input.name);
        assert_eq!(record.salary, input.salary);
        assert_eq!(record.currency, input.currency);
        assert!(record.on_contract);
        assert_eq!(record.department, input.department);
        assert_eq!(record.sub_department, input.sub_department);
    }

    #[tokio::test]
    async fn on_contract_round_trips_through_integer_storage() {
        let store = make_store().await;
        let a = store
            .insert(NewSalary {
                on_contract: true,
                ..salary("A", 100.0, "Eng", "Core")
            })
            .await
            .unwrap();
        let b = store
            .insert(salary("B", 200.0, "Eng", "Core"))
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert!(listed.iter().find(|r| r.id == a.id).unwrap().on_contract);
        assert!(!listed.iter().find(|r| r.id == b.id).unwrap().on_contract);
    }

    #[tokio::test]
    async fn delete_returns_true_once_then_false() {
        let store = make_store().await;
        let record = store
            .insert(salary("A", 100.0, "Eng", "Core"))
            .await
            .unwrap();

        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_nonexistent_id_is_not_an_error() {
        let store = make_store().await;
        assert!(!store.delete(424242).await.unwrap());
    }

    #[tokio::test]
    async fn list_returns_all_records() {
        let store = make_store().await;
        for i in 0..3 {
            store
                .insert(salary(&format!("P{i}"), 100.0 * (i + 1) as f64, "Eng", "Core"))
                .await
                .unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stats_over_empty_table_is_null() {
        let store = make_store().await;
        let stats = store.stats(&SalaryFilter::default()).await.unwrap();
        assert_eq!(
            stats,
            SalaryStats {
                avg: None,
                max: None,
                min: None
            }
        );
    }

    #[tokio::test]
    async fn stats_without_filter() {
        let store = make_store().await;
        store.insert(salary("A", 100.0, "Eng", "Core")).await.unwrap();
        store.insert(salary("B", 300.0, "Eng", "Core")).await.unwrap();

        let stats = store.stats(&SalaryFilter::default()).await.unwrap();
        assert_eq!(stats.avg, Some(200.0));
        assert_eq!(stats.max, Some(300.0));
        assert_eq!(stats.min, Some(100.0));
    }

    #[tokio::test]
    async fn empty_filter_equals_unfiltered() {
        let store = make_store().await;
        store.insert(salary("A", 50.0, "Eng", "Core")).await.unwrap();
        store.insert(salary("B", 150.0, "Sales", "EMEA")).await.unwrap();

        let unfiltered = store.stats(&SalaryFilter::default()).await.unwrap();
        let empty_filter = store
            .stats(&SalaryFilter {
                currency: None,
                on_contract: None,
            })
            .await
            .unwrap();
        assert_eq!(unfiltered, empty_filter);
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let store = make_store().await;
        // Matches both conditions.
        store
            .insert(NewSalary {
                on_contract: true,
                ..salary("A", 100.0, "Eng", "Core")
            })
            .await
            .unwrap();
        // Right currency, wrong contract status.
        store.insert(salary("B", 900.0, "Eng", "Core")).await.unwrap();
        // Wrong currency, right contract status.
        store
            .insert(NewSalary {
                currency: "EUR".into(),
                on_contract: true,
                ..salary("C", 500.0, "Eng", "Core")
            })
            .await
            .unwrap();

        let stats = store
            .stats(&SalaryFilter {
                currency: Some("USD".into()),
                on_contract: Some(true),
            })
            .await
            .unwrap();
        assert_eq!(stats.avg, Some(100.0));
        assert_eq!(stats.max, Some(100.0));
        assert_eq!(stats.min, Some(100.0));
    }

    #[tokio::test]
    async fn currency_filter_is_exact_after_normalization() {
        let store = make_store().await;
        store.insert(salary("A", 100.0, "Eng", "Core")).await.unwrap();

        // The store itself is case-sensitive; uppercasing happens at the
        // handler boundary.
        let lower = store
            .stats(&SalaryFilter {
                currency: Some("usd".into()),
                on_contract: None,
            })
            .await
            .unwrap();
        assert_eq!(lower.avg, None);

        let upper = store
            .stats(&SalaryFilter {
                currency: Some("USD".into()),
                on_contract: None,
            })
            .await
            .unwrap();
        assert_eq!(upper.avg, Some(100.0));
    }

    #[tokio::test]
    async fn stats_by_department_partitions_rows() {
        let store = make_store().await;
        store.insert(salary("A", 100.0, "Eng", "Core")).await.unwrap();
        store.insert(salary("B", 300.0, "Eng", "Core")).await.unwrap();
        store.insert(salary("C", 200.0, "Sales", "EMEA")).await.unwrap();

        let mut rows = store
            .stats_by_department(&SalaryFilter::default())
            .await
            .unwrap();
        rows.sort_by(|a, b| a.department.cmp(&b.department));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].department, "Eng");
        assert_eq!(rows[0].avg, 200.0);
        assert_eq!(rows[0].min, 100.0);
        assert_eq!(rows[0].max, 300.0);
        assert_eq!(rows[1].department, "Sales");
        assert_eq!(rows[1].avg, 200.0);
        assert_eq!(rows[1].min, 200.0);
        assert_eq!(rows[1].max, 200.0);
    }

    #[tokio::test]
    async fn grouping_is_case_sensitive_on_literal_values() {
        let store = make_store().await;
        store.insert(salary("A", 100.0, "Eng", "Core")).await.unwrap();
        store.insert(salary("B", 200.0, "eng", "Core")).await.unwrap();

        let rows = store
            .stats_by_department(&SalaryFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn stats_by_department_and_sub_department_partitions_pairs() {
        let store = make_store().await;
        store.insert(salary("A", 100.0, "Eng", "Core")).await.unwrap();
        store.insert(salary("B", 300.0, "Eng", "Platform")).await.unwrap();
        store.insert(salary("C", 200.0, "Eng", "Core")).await.unwrap();

        let mut rows = store
            .stats_by_department_and_sub_department(&SalaryFilter::default())
            .await
            .unwrap();
        rows.sort_by(|a, b| a.sub_department.cmp(&b.sub_department));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sub_department, "Core");
        assert_eq!(rows[0].avg, 150.0);
        assert_eq!(rows[1].sub_department, "Platform");
        assert_eq!(rows[1].avg, 300.0);
    }

    #[tokio::test]
    async fn grouped_stats_honor_filters() {
        let store = make_store().await;
        store
            .insert(NewSalary {
                on_contract: true,
                ..salary("A", 100.0, "Eng", "Core")
            })
            .await
            .unwrap();
        store.insert(salary("B", 900.0, "Eng", "Core")).await.unwrap();

        let rows = store
            .stats_by_department(&SalaryFilter {
                currency: None,
                on_contract: Some(true),
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg, 100.0);
    }

    #[test]
    fn where_clause_composition() {
        assert_eq!(where_clause(&SalaryFilter::default()), "");
        assert_eq!(
            where_clause(&SalaryFilter {
                currency: Some("USD".into()),
                on_contract: None,
            }),
            " WHERE currency = ?"
        );
        assert_eq!(
            where_clause(&SalaryFilter {
                currency: None,
                on_contract: Some(false),
            }),
            " WHERE on_contract = ?"
        );
        assert_eq!(
            where_clause(&SalaryFilter {
                currency: Some("USD".into()),
                on_contract: Some(true),
            }),
            " WHERE currency = ? AND on_contract = ?"
        );
    }
}
