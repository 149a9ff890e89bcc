//! Generic CRUD over the marketplace tables.
//!
//! Every entity implements [`Resource`], which names its table, its joined
//! `SELECT` and the integrity rules checked before a write. [`Repository`]
//! turns those descriptions into lookups and parameterized statements, so each
//! handler only builds a [`Patch`] and reports the outcome.

use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::FromRow;
use std::marker::PhantomData;
use thiserror::Error;
use uuid::Uuid;

use super::connection::{Database, DbError};
use super::statement::{Patch, Statement, Value};

/// A column whose values must be unique across the table
#[derive(Debug, Clone, Copy)]
pub struct UniqueKey {
    pub column: &'static str,
    pub message: &'static str,
}

/// A foreign key column and the table it must point into
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub column: &'static str,
    pub table: &'static str,
    pub message: &'static str,
}

/// Rows in another table that block deleting a row of this one
#[derive(Debug, Clone, Copy)]
pub struct Dependent {
    pub table: &'static str,
    pub column: &'static str,
    pub message: &'static str,
}

pub trait Resource: for<'r> FromRow<'r, AnyRow> + Serialize + Send + Unpin + 'static {
    /// Table name
    const TABLE: &'static str;
    /// Alias of `TABLE` inside `SELECT`
    const ALIAS: &'static str;
    /// Display name used in error messages
    const NAME: &'static str;
    /// Joined projection, without a WHERE clause
    const SELECT: &'static str;
    const UNIQUE: &'static [UniqueKey] = &[];
    const REFERENCES: &'static [Reference] = &[];
    const DEPENDENTS: &'static [Dependent] = &[];
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    InvalidReference(&'static str),

    #[error("{0}")]
    InUse(&'static str),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    /// Case-insensitive equality on a text column
    EqIgnoreCase(&'static str, String),
    /// Substring match on any of the columns
    Contains(&'static [&'static str], String),
}

/// WHERE / ORDER BY / LIMIT for [`Repository::list`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    filters: Vec<Filter>,
    order_by: Option<&'static str>,
    limit: Option<u32>,
}

/// Escape LIKE wildcards; pairs with `ESCAPE '!'`
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn compile(&self, select: &str) -> Statement {
        let mut clauses = Vec::with_capacity(self.filters.len());
        let mut params = Vec::new();

        for filter in &self.filters {
            match filter {
                Filter::Eq(column, value) => {
                    clauses.push(format!("{} = ?", column));
                    params.push(value.clone());
                }
                Filter::EqIgnoreCase(column, value) => {
                    clauses.push(format!("LOWER({}) = ?", column));
                    params.push(Value::Text(value.to_lowercase()));
                }
                Filter::Contains(columns, term) => {
                    let pattern = like_pattern(&term.to_lowercase());
                    let any: Vec<String> = columns
                        .iter()
                        .map(|c| {
                            params.push(Value::Text(pattern.clone()));
                            format!("LOWER({}) LIKE ? ESCAPE '!'", c)
                        })
                        .collect();
                    clauses.push(format!("({})", any.join(" OR ")));
                }
            }
        }

        let mut sql = select.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        params
            .into_iter()
            .fold(Statement::new(sql), |stmt, value| stmt.bind(value))
    }
}

pub struct Repository<'a, R> {
    db: &'a Database,
    _resource: PhantomData<fn() -> R>,
}

impl<'a, R: Resource> Repository<'a, R> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            _resource: PhantomData,
        }
    }

    pub async fn list(&self, query: ListQuery) -> Result<Vec<R>, RepoError> {
        Ok(self.db.query(query.compile(R::SELECT)).await?)
    }

    pub async fn find(&self, id: &str) -> Result<Option<R>, RepoError> {
        let stmt = Statement::new(format!("{} WHERE {}.id = ?", R::SELECT, R::ALIAS)).bind(id);
        Ok(self.db.query_one(stmt).await?)
    }

    pub async fn get(&self, id: &str) -> Result<R, RepoError> {
        self.find(id).await?.ok_or(RepoError::NotFound(R::NAME))
    }

    pub async fn exists(&self, id: &str) -> Result<bool, RepoError> {
        let stmt = Statement::new(format!("SELECT COUNT(*) FROM {} WHERE id = ?", R::TABLE)).bind(id);
        Ok(self.db.count(stmt).await? > 0)
    }

    async fn check_references(&self, patch: &Patch) -> Result<(), RepoError> {
        for reference in R::REFERENCES {
            let Some(value) = patch.get(reference.column) else {
                continue;
            };
            if *value == Value::Null {
                continue;
            }
            let stmt = Statement::new(format!(
                "SELECT COUNT(*) FROM {} WHERE id = ?",
                reference.table
            ))
            .bind(value.clone());
            if self.db.count(stmt).await? == 0 {
                return Err(RepoError::InvalidReference(reference.message));
            }
        }
        Ok(())
    }

    async fn check_unique(&self, patch: &Patch, exclude: Option<&str>) -> Result<(), RepoError> {
        for key in R::UNIQUE {
            let Some(value) = patch.get(key.column) else {
                continue;
            };
            if *value == Value::Null {
                continue;
            }
            let mut sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?", R::TABLE, key.column);
            if exclude.is_some() {
                sql.push_str(" AND id <> ?");
            }
            let mut stmt = Statement::new(sql).bind(value.clone());
            if let Some(id) = exclude {
                stmt = stmt.bind(id);
            }
            if self.db.count(stmt).await? > 0 {
                return Err(RepoError::Conflict(key.message));
            }
        }
        Ok(())
    }

    /// Insert a new row under a fresh id and return it joined
    pub async fn insert(&self, patch: Patch) -> Result<R, RepoError> {
        self.check_references(&patch).await?;
        self.check_unique(&patch, None).await?;

        let id = Uuid::new_v4().to_string();
        let now = super::now();
        self.db.execute(patch.into_insert(R::TABLE, &id, &now)).await?;
        self.get(&id).await
    }

    /// Write only the supplied columns and return the refreshed row
    pub async fn update(&self, id: &str, patch: Patch) -> Result<R, RepoError> {
        if !self.exists(id).await? {
            return Err(RepoError::NotFound(R::NAME));
        }
        self.check_references(&patch).await?;
        self.check_unique(&patch, Some(id)).await?;

        let now = super::now();
        self.db.execute(patch.into_update(R::TABLE, id, &now)).await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RepoError> {
        if !self.exists(id).await? {
            return Err(RepoError::NotFound(R::NAME));
        }
        for dependent in R::DEPENDENTS {
            let stmt = Statement::new(format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ?",
                dependent.table, dependent.column
            ))
            .bind(id);
            if self.db.count(stmt).await? > 0 {
                return Err(RepoError::InUse(dependent.message));
            }
        }

        let stmt = Statement::new(format!("DELETE FROM {} WHERE id = ?", R::TABLE)).bind(id);
        self.db.execute(stmt).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Category, LabourProfile};
    use crate::db::test_database;

    fn category(name: &str) -> Patch {
        let mut patch = Patch::new();
        patch.set("name_en", name).set("status", "active");
        patch
    }

    fn labour(name: &str, category_id: &str, phone: &str) -> Patch {
        let mut patch = Patch::new();
        patch
            .set("name", name)
            .set("category_id", category_id)
            .set("city", "Lahore")
            .set("phone", phone)
            .set("status", "approved")
            .set("rating", 0.0)
            .set("hourly_rate", 0.0)
            .set("experience_years", 0i64);
        patch
    }

    #[test]
    fn test_list_query_compiles_filters_in_order() {
        let stmt = ListQuery::new()
            .eq("lp.status", "approved")
            .filter(Filter::EqIgnoreCase("lp.city", "Lahore".into()))
            .filter(Filter::Contains(&["lp.name", "lp.description"], "50%".into()))
            .order_by("lp.rating DESC")
            .limit(10)
            .compile("SELECT * FROM labour_profiles lp");

        assert_eq!(
            stmt.sql(),
            "SELECT * FROM labour_profiles lp WHERE lp.status = ? AND LOWER(lp.city) = ? \
             AND (LOWER(lp.name) LIKE ? ESCAPE '!' OR LOWER(lp.description) LIKE ? ESCAPE '!') \
             ORDER BY lp.rating DESC LIMIT 10"
        );
        assert_eq!(stmt.params()[1], Value::Text("lahore".into()));
        assert_eq!(stmt.params()[2], Value::Text("%50!%%".into()));
    }

    #[tokio::test]
    async fn test_insert_returns_joined_row() {
        let db = test_database().await;
        let plumbing = Repository::<Category>::new(&db)
            .insert(category("Plumbing"))
            .await
            .unwrap();

        let profile = Repository::<LabourProfile>::new(&db)
            .insert(labour("Asad", &plumbing.id, "03001234567"))
            .await
            .unwrap();

        assert_eq!(profile.category_name.as_deref(), Some("Plumbing"));
        assert_eq!(profile.created_at, profile.updated_at);
    }

    #[tokio::test]
    async fn test_unique_key_is_checked_before_insert_and_update() {
        let db = test_database().await;
        let repo = Repository::<Category>::new(&db);
        repo.insert(category("Plumbing")).await.unwrap();
        let electrical = repo.insert(category("Electrical")).await.unwrap();

        let err = repo.insert(category("Plumbing")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        let err = repo
            .update(&electrical.id, category("Plumbing"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        // Renaming to its own current name is not a conflict
        repo.update(&electrical.id, category("Electrical")).await.unwrap();
    }

    #[tokio::test]
    async fn test_reference_must_exist() {
        let db = test_database().await;
        let err = Repository::<LabourProfile>::new(&db)
            .insert(labour("Asad", "missing-category", "03001234567"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_dependents_block_delete() {
        let db = test_database().await;
        let categories = Repository::<Category>::new(&db);
        let plumbing = categories.insert(category("Plumbing")).await.unwrap();
        let profile = Repository::<LabourProfile>::new(&db)
            .insert(labour("Asad", &plumbing.id, "03001234567"))
            .await
            .unwrap();

        let err = categories.delete(&plumbing.id).await.unwrap_err();
        assert!(matches!(err, RepoError::InUse(_)));

        Repository::<LabourProfile>::new(&db)
            .delete(&profile.id)
            .await
            .unwrap();
        categories.delete(&plumbing.id).await.unwrap();
        assert!(categories.find(&plumbing.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let db = test_database().await;
        let err = Repository::<Category>::new(&db)
            .update("nope", category("Plumbing"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound("Category")));
    }

    #[tokio::test]
    async fn test_list_filters_case_insensitively() {
        let db = test_database().await;
        let plumbing = Repository::<Category>::new(&db)
            .insert(category("Plumbing"))
            .await
            .unwrap();
        let repo = Repository::<LabourProfile>::new(&db);
        repo.insert(labour("Asad Khan", &plumbing.id, "1")).await.unwrap();
        let mut karachi = labour("Bilal", &plumbing.id, "2");
        karachi.set("city", "Karachi");
        repo.insert(karachi).await.unwrap();

        let found = repo
            .list(ListQuery::new().filter(Filter::EqIgnoreCase("lp.city", "LAHORE".into())))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Asad Khan");

        let found = repo
            .list(ListQuery::new().filter(Filter::Contains(&["lp.name"], "khan".into())))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
