use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CatalogRepo, CatalogWriteRepo, CreateSubjectParams, RepoError, SubjectSearchQuery,
    UpdateSubjectParams,
};
use crate::domain::catalog::SubjectKind;
use crate::domain::entities::SubjectRecord;

use super::types::SubjectRow;
use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl CatalogRepo for PostgresRepositories {
    async fn find_subject(&self, id: Uuid) -> Result<Option<SubjectRecord>, RepoError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, kind, title, creator, released_on, reviews_count, star_average, \
                    created_at, updated_at \
             FROM subjects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SubjectRecord::from))
    }

    async fn list_subjects_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SubjectRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, kind, title, creator, released_on, reviews_count, star_average, \
                    created_at, updated_at \
             FROM subjects WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SubjectRecord::from).collect())
    }

    async fn search_subject_ids(&self, query: &SubjectSearchQuery) -> Result<Vec<Uuid>, RepoError> {
        if query.kinds.is_empty() || query.tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new("SELECT id FROM subjects WHERE kind = ANY(");
        qb.push_bind(query.kinds.clone());
        qb.push(")");

        for token in &query.tokens {
            let pattern = format!("%{}%", token);
            qb.push(" AND (title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR creator ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        qb.push(" ORDER BY reviews_count DESC, title ASC LIMIT ");
        qb.push_bind(query.limit as i64);

        qb.build_query_scalar::<Uuid>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn popular_subject_ids(
        &self,
        kind: SubjectKind,
        limit: u32,
    ) -> Result<Vec<Uuid>, RepoError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM subjects WHERE kind = $1 \
             ORDER BY reviews_count DESC, title ASC LIMIT $2",
        )
        .bind(kind)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn top_rated_subject_ids(
        &self,
        kind: SubjectKind,
        limit: u32,
        min_reviews: i64,
    ) -> Result<Vec<Uuid>, RepoError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM subjects WHERE kind = $1 AND reviews_count >= $2 \
             ORDER BY star_average DESC, reviews_count DESC, title ASC LIMIT $3",
        )
        .bind(kind)
        .bind(min_reviews)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl CatalogWriteRepo for PostgresRepositories {
    async fn create_subject(
        &self,
        params: CreateSubjectParams,
    ) -> Result<SubjectRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, SubjectRow>(
            "INSERT INTO subjects \
                 (id, kind, title, creator, released_on, reviews_count, star_average, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $6) \
             RETURNING id, kind, title, creator, released_on, reviews_count, star_average, \
                       created_at, updated_at",
        )
        .bind(id)
        .bind(params.kind)
        .bind(params.title)
        .bind(params.creator)
        .bind(params.released_on)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(SubjectRecord::from(row))
    }

    async fn update_subject(
        &self,
        params: UpdateSubjectParams,
    ) -> Result<SubjectRecord, RepoError> {
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, SubjectRow>(
            "UPDATE subjects \
                SET title = $2, creator = $3, released_on = $4, updated_at = $5 \
              WHERE id = $1 \
             RETURNING id, kind, title, creator, released_on, reviews_count, star_average, \
                       created_at, updated_at",
        )
        .bind(params.id)
        .bind(params.title)
        .bind(params.creator)
        .bind(params.released_on)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(SubjectRecord::from(row))
    }

    async fn delete_subject(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
