use crate::prelude::*;

use std::ops::Range;

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{CaseGrouping, CaseOrder, CaseQuery, GroupTotals, RecordStore, WriteOutcome};
use crate::base::{Case, CaseFilter, OfficeSettings, StaffMember, StatusScope};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS casevault_cases (
        id UUID PRIMARY KEY,
        version BIGINT NOT NULL,
        approval_status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        session_date TIMESTAMPTZ,
        postponed_to TIMESTAMPTZ,
        doc JSONB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS casevault_cases_status_created
        ON casevault_cases (approval_status, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS casevault_staff (
        id UUID PRIMARY KEY,
        registration_code TEXT NOT NULL,
        national_id TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        doc JSONB NOT NULL,
        CONSTRAINT casevault_staff_registration_code_key UNIQUE (registration_code),
        CONSTRAINT casevault_staff_national_id_key UNIQUE (national_id)
    )",
    "CREATE TABLE IF NOT EXISTS casevault_office_settings (
        singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
        doc JSONB NOT NULL
    )",
];

/// Stores each record as a JSONB document, with the columns listings sort and
/// filter on pulled out next to it.
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Tells apart a missing case from one at another version after a
    /// conditional write touched no row.
    async fn classify_miss(&self, id: Uuid) -> Result<WriteOutcome> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT version FROM casevault_cases WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match found {
            None => WriteOutcome::Missing,
            Some(found) => WriteOutcome::VersionMismatch {
                found: found.max(0) as u64,
            },
        })
    }

    pub async fn apply_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply the record store schema")?;
        }
        Ok(())
    }
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}

fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &CaseFilter, scope: StatusScope) {
    qb.push(" WHERE TRUE");
    if let Some(status) = scope.status() {
        qb.push(" AND approval_status = ").push_bind(status.as_str());
    }
    for (field, term) in filter.text_terms() {
        // `field` comes from a fixed list of JSON keys, never from input.
        qb.push(format!(" AND doc->>'{field}' ILIKE "))
            .push_bind(format!("%{}%", escape_like(term)));
    }
    if let Some(year) = filter.year {
        qb.push(" AND (doc->>'year')::int = ").push_bind(year);
    }
    for (column, day) in [
        ("session_date", filter.session_date),
        ("postponed_to", filter.postponed_to),
    ] {
        if let Some(day) = day {
            let (start, end) = day_bounds(day);
            qb.push(format!(" AND {column} >= "))
                .push_bind(start)
                .push(format!(" AND {column} < "))
                .push_bind(end);
        }
    }
}

fn to_db_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::validation(format!("{value} is out of range")))
}

/// Maps unique-constraint violations on staff rows to `Error::Duplicate`.
fn staff_insert_error(err: sqlx::Error, staff: &StaffMember) -> Error {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.code().as_deref() == Some("23505")
    {
        return match db_err.constraint() {
            Some("casevault_staff_national_id_key") => Error::Duplicate {
                field: "nationalId",
                value: staff.national_id.clone().unwrap_or_default(),
            },
            Some("casevault_staff_registration_code_key") => Error::Duplicate {
                field: "registrationCode",
                value: staff.registration_code.clone(),
            },
            _ => Error::Duplicate {
                field: "id",
                value: staff.id.to_string(),
            },
        };
    }
    err.into()
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn insert_case(&self, case: &Case) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO casevault_cases
                (id, version, approval_status, created_at, session_date, postponed_to, doc)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(case.id)
        .bind(to_db_i64(case.version)?)
        .bind(case.approval_status.as_str())
        .bind(case.created_at)
        .bind(case.session_date)
        .bind(case.postponed_to)
        .bind(Json(case))
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(Error::Duplicate {
                    field: "id",
                    value: case.id.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
        let doc: Option<Json<Case>> =
            sqlx::query_scalar("SELECT doc FROM casevault_cases WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(doc.map(|Json(case)| case))
    }

    async fn replace_case(&self, case: &Case, expected_version: u64) -> Result<WriteOutcome> {
        let updated = sqlx::query(
            "UPDATE casevault_cases
             SET version = $2, approval_status = $3, session_date = $4, postponed_to = $5, doc = $6
             WHERE id = $1 AND version = $7",
        )
        .bind(case.id)
        .bind(to_db_i64(case.version)?)
        .bind(case.approval_status.as_str())
        .bind(case.session_date)
        .bind(case.postponed_to)
        .bind(Json(case))
        .bind(to_db_i64(expected_version)?)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() > 0 {
            return Ok(WriteOutcome::Applied);
        }
        self.classify_miss(case.id).await
    }

    async fn remove_case(&self, id: Uuid, expected_version: u64) -> Result<WriteOutcome> {
        let removed = sqlx::query("DELETE FROM casevault_cases WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(to_db_i64(expected_version)?)
            .execute(&self.pool)
            .await?;
        if removed.rows_affected() > 0 {
            return Ok(WriteOutcome::Applied);
        }
        self.classify_miss(id).await
    }

    async fn query_cases(&self, query: &CaseQuery) -> Result<Vec<Case>> {
        let mut qb = QueryBuilder::new("SELECT doc FROM casevault_cases");
        push_conditions(&mut qb, &query.filter, query.scope);
        qb.push(match query.order {
            CaseOrder::NewestFirst => " ORDER BY created_at DESC, id",
            CaseOrder::PostponedToAscending => " ORDER BY postponed_to ASC NULLS LAST, id",
        });
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(to_db_i64(limit)?);
        }
        qb.push(" OFFSET ").push_bind(to_db_i64(query.offset)?);

        let docs: Vec<Json<Case>> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(docs.into_iter().map(|Json(case)| case).collect())
    }

    async fn count_cases(&self, filter: &CaseFilter, scope: StatusScope) -> Result<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM casevault_cases");
        push_conditions(&mut qb, filter, scope);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn all_cases(&self) -> Result<Vec<Case>> {
        let docs: Vec<Json<Case>> =
            sqlx::query_scalar("SELECT doc FROM casevault_cases ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(docs.into_iter().map(|Json(case)| case).collect())
    }

    async fn referenced_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT image->>'externalId'
             FROM casevault_cases, jsonb_array_elements(doc->'images') AS image
             WHERE image->>'externalId' = ANY($1)",
        )
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(found.into_iter().collect())
    }

    async fn sum_cases(
        &self,
        grouping: CaseGrouping,
        created: Option<Range<DateTime<Utc>>>,
    ) -> Result<Vec<GroupTotals>> {
        let rows: Vec<(Option<String>, i64, f64, f64, f64)> = build_sum_query(grouping, created)
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(key, count, expenses, paid, remaining)| GroupTotals {
                key,
                count: count.max(0) as u64,
                expenses,
                paid,
                remaining,
            })
            .collect())
    }

    async fn insert_staff(&self, staff: &StaffMember) -> Result<()> {
        sqlx::query(
            "INSERT INTO casevault_staff (id, registration_code, national_id, created_at, doc)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(staff.id)
        .bind(&staff.registration_code)
        .bind(&staff.national_id)
        .bind(staff.created_at)
        .bind(Json(staff))
        .execute(&self.pool)
        .await
        .map_err(|err| staff_insert_error(err, staff))?;
        Ok(())
    }

    async fn all_staff(&self) -> Result<Vec<StaffMember>> {
        let docs: Vec<Json<StaffMember>> =
            sqlx::query_scalar("SELECT doc FROM casevault_staff ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;
        Ok(docs.into_iter().map(|Json(staff)| staff).collect())
    }

    async fn get_settings(&self) -> Result<Option<OfficeSettings>> {
        let doc: Option<Json<OfficeSettings>> =
            sqlx::query_scalar("SELECT doc FROM casevault_office_settings WHERE singleton")
                .fetch_optional(&self.pool)
                .await?;
        Ok(doc.map(|Json(settings)| settings))
    }

    async fn put_settings(&self, settings: &OfficeSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO casevault_office_settings (singleton, doc) VALUES (TRUE, $1)
             ON CONFLICT (singleton) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(Json(settings))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn build_sum_query(
    grouping: CaseGrouping,
    created: Option<Range<DateTime<Utc>>>,
) -> QueryBuilder<'static, Postgres> {
    let key = match grouping {
        CaseGrouping::ApprovalStatus => "approval_status",
        CaseGrouping::CaseType => "doc->>'caseType'",
    };
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(key).push(
        " AS key, COUNT(*),
         COALESCE(SUM((doc->>'expenses')::float8), 0),
         COALESCE(SUM((doc->>'paid')::float8), 0),
         COALESCE(SUM((doc->>'remaining')::float8), 0)
         FROM casevault_cases",
    );
    if let Some(created) = created {
        qb.push(" WHERE created_at >= ")
            .push_bind(created.start)
            .push(" AND created_at < ")
            .push_bind(created.end);
    }
    qb.push(" GROUP BY 1 ORDER BY 2 DESC, 1");
    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("قضية"), "قضية");
    }

    #[test]
    fn test_filter_sql() {
        let filter = CaseFilter {
            client_name: Some("ali".into()),
            year: Some(2024),
            postponed_to: NaiveDate::from_ymd_opt(2024, 3, 10),
            ..Default::default()
        };
        let mut qb = QueryBuilder::new("SELECT doc FROM casevault_cases");
        push_conditions(&mut qb, &filter, StatusScope::Approved);
        expect_test::expect![[r#"SELECT doc FROM casevault_cases WHERE TRUE AND approval_status = $1 AND doc->>'clientName' ILIKE $2 AND (doc->>'year')::int = $3 AND postponed_to >= $4 AND postponed_to < $5"#]]
            .assert_eq(qb.sql());
    }

    #[test]
    fn test_sum_sql() {
        let qb = build_sum_query(CaseGrouping::CaseType, None);
        assert!(qb.sql().starts_with("SELECT doc->>'caseType' AS key, COUNT(*)"));
        assert!(!qb.sql().contains("WHERE"));

        let window = Utc::now()..Utc::now();
        let qb = build_sum_query(CaseGrouping::ApprovalStatus, Some(window));
        assert!(qb.sql().starts_with("SELECT approval_status AS key"));
        let tail = " WHERE created_at >= $1 AND created_at < $2 GROUP BY 1 ORDER BY 2 DESC, 1";
        assert!(qb.sql().ends_with(tail), "{}", qb.sql());
    }
}
