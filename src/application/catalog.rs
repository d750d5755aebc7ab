use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use time::Date;
use uuid::Uuid;

use crate::application::audit::AuditService;
use crate::application::error::AppError;
use crate::application::identity::Actor;
use crate::application::repos::{
    CatalogRepo, CatalogWriteRepo, CreateSubjectParams, SubjectSearchQuery, UpdateSubjectParams,
};
use crate::cache::{
    CacheConfig, CacheKey, CacheTrigger, ListStore, hash_search_key, normalize_query,
};
use crate::domain::catalog::SubjectKind;
use crate::domain::entities::SubjectRecord;
use crate::domain::reviews::validate_title;

const DEFAULT_MIN_REVIEWS_FOR_TOP_RATED: i64 = 3;

#[derive(Debug, Clone)]
pub struct RegisterSubjectCommand {
    pub kind: SubjectKind,
    pub title: String,
    pub creator: Option<String>,
    pub released_on: Option<Date>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubjectCommand {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub released_on: Option<Date>,
}

#[derive(Serialize)]
struct SubjectSnapshot<'a> {
    kind: SubjectKind,
    title: &'a str,
}

/// Catalogue reads and writes, with the read side served through the
/// list cache.
///
/// Cached queries store ordered subject ids only; every call hydrates
/// them against the live store, so star aggregates are never stale even
/// when the id list is. Writes publish invalidation events over the
/// trigger so dependent lists recompute on their next read.
#[derive(Clone)]
pub struct CatalogService {
    reader: Arc<dyn CatalogRepo>,
    writer: Arc<dyn CatalogWriteRepo>,
    audit: AuditService,
    list_cache: Option<Arc<ListStore>>,
    cache_config: CacheConfig,
    cache_trigger: Option<Arc<CacheTrigger>>,
    min_reviews_for_top_rated: i64,
}

impl CatalogService {
    pub fn new(
        reader: Arc<dyn CatalogRepo>,
        writer: Arc<dyn CatalogWriteRepo>,
        audit: AuditService,
    ) -> Self {
        Self {
            reader,
            writer,
            audit,
            list_cache: None,
            cache_config: CacheConfig::default(),
            cache_trigger: None,
            min_reviews_for_top_rated: DEFAULT_MIN_REVIEWS_FOR_TOP_RATED,
        }
    }

    /// Serve search/ranking reads through the given list cache.
    pub fn with_list_cache(mut self, store: Arc<ListStore>, config: CacheConfig) -> Self {
        self.list_cache = Some(store);
        self.cache_config = config;
        self
    }

    /// Set the cache trigger for this service.
    pub fn with_cache_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.cache_trigger = Some(trigger);
        self
    }

    /// Set the cache trigger for this service (optional).
    pub fn with_cache_trigger_opt(mut self, trigger: Option<Arc<CacheTrigger>>) -> Self {
        self.cache_trigger = trigger;
        self
    }

    /// Rating rankings ignore subjects with fewer reviews than this.
    pub fn with_min_reviews_for_top_rated(mut self, min_reviews: i64) -> Self {
        self.min_reviews_for_top_rated = min_reviews;
        self
    }

    pub async fn subject(&self, id: Uuid) -> Result<Option<SubjectRecord>, AppError> {
        Ok(self.reader.find_subject(id).await?)
    }

    /// Live fetch preserving the order of `ids`; unknown ids are skipped.
    pub async fn subjects_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SubjectRecord>, AppError> {
        self.hydrate(ids.to_vec()).await
    }

    /// Token search across the music kinds (projects, songs, covers and
    /// music videos), ordered by review count then title.
    pub async fn search_music(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SubjectRecord>, AppError> {
        let tokens = normalize_query(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let search = SubjectSearchQuery {
            kinds: SubjectKind::MUSIC.to_vec(),
            tokens,
            limit,
        };
        let key = CacheKey::MusicSearch {
            params_hash: hash_search_key(query, limit),
        };

        let ids = match &self.list_cache {
            Some(cache) => {
                let reader = Arc::clone(&self.reader);
                cache
                    .get_or_compute(
                        key,
                        self.cache_config.search_ttl(),
                        &SubjectKind::MUSIC,
                        move || async move { reader.search_subject_ids(&search).await },
                    )
                    .await?
            }
            None => self.reader.search_subject_ids(&search).await?,
        };
        self.hydrate(ids).await
    }

    /// Token search within a single subject kind.
    pub async fn search_subjects(
        &self,
        kind: SubjectKind,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SubjectRecord>, AppError> {
        let tokens = normalize_query(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let search = SubjectSearchQuery {
            kinds: vec![kind],
            tokens,
            limit,
        };
        let key = CacheKey::SubjectSearch {
            kind,
            params_hash: hash_search_key(query, limit),
        };

        let ids = match &self.list_cache {
            Some(cache) => {
                let reader = Arc::clone(&self.reader);
                cache
                    .get_or_compute(
                        key,
                        self.cache_config.search_ttl(),
                        &[kind],
                        move || async move { reader.search_subject_ids(&search).await },
                    )
                    .await?
            }
            None => self.reader.search_subject_ids(&search).await?,
        };
        self.hydrate(ids).await
    }

    /// Subjects of one kind ranked by review count.
    pub async fn popular(
        &self,
        kind: SubjectKind,
        limit: u32,
    ) -> Result<Vec<SubjectRecord>, AppError> {
        let key = CacheKey::Popular { kind, limit };
        let ids = match &self.list_cache {
            Some(cache) => {
                let reader = Arc::clone(&self.reader);
                cache
                    .get_or_compute(
                        key,
                        self.cache_config.ranking_ttl(),
                        &[kind],
                        move || async move { reader.popular_subject_ids(kind, limit).await },
                    )
                    .await?
            }
            None => self.reader.popular_subject_ids(kind, limit).await?,
        };
        self.hydrate(ids).await
    }

    /// Subjects of one kind ranked by star average. Subjects below the
    /// review floor stay out so a single five-star review cannot top the
    /// chart.
    pub async fn top_rated(
        &self,
        kind: SubjectKind,
        limit: u32,
    ) -> Result<Vec<SubjectRecord>, AppError> {
        let min_reviews = self.min_reviews_for_top_rated;
        let key = CacheKey::TopRated { kind, limit };
        let ids = match &self.list_cache {
            Some(cache) => {
                let reader = Arc::clone(&self.reader);
                cache
                    .get_or_compute(
                        key,
                        self.cache_config.ranking_ttl(),
                        &[kind],
                        move || async move {
                            reader.top_rated_subject_ids(kind, limit, min_reviews).await
                        },
                    )
                    .await?
            }
            None => {
                self.reader
                    .top_rated_subject_ids(kind, limit, min_reviews)
                    .await?
            }
        };
        self.hydrate(ids).await
    }

    /// Adds a subject to the catalogue.
    pub async fn register_subject(
        &self,
        actor: &Actor,
        command: RegisterSubjectCommand,
    ) -> Result<SubjectRecord, AppError> {
        actor.require_user()?;
        validate_title(&command.title)?;

        let subject = self
            .writer
            .create_subject(CreateSubjectParams {
                kind: command.kind,
                title: command.title,
                creator: command.creator,
                released_on: command.released_on,
            })
            .await?;

        let snapshot = SubjectSnapshot {
            kind: subject.kind,
            title: subject.title.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "subject.register",
                "subject",
                Some(&subject.id.to_string()),
                Some(&snapshot),
            )
            .await;

        if let Some(trigger) = &self.cache_trigger {
            trigger.subject_upserted(subject.kind, subject.id).await;
        }

        Ok(subject)
    }

    /// Applies a partial update to a subject's descriptive fields.
    pub async fn update_subject(
        &self,
        actor: &Actor,
        id: Uuid,
        command: UpdateSubjectCommand,
    ) -> Result<SubjectRecord, AppError> {
        actor.require_user()?;
        if let Some(title) = &command.title {
            validate_title(title)?;
        }

        let existing = self
            .reader
            .find_subject(id)
            .await?
            .ok_or(AppError::NotFound)?;

        let subject = self
            .writer
            .update_subject(UpdateSubjectParams {
                id,
                title: command.title.unwrap_or(existing.title),
                creator: command.creator.or(existing.creator),
                released_on: command.released_on.or(existing.released_on),
            })
            .await?;

        let snapshot = SubjectSnapshot {
            kind: subject.kind,
            title: subject.title.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "subject.update",
                "subject",
                Some(&subject.id.to_string()),
                Some(&snapshot),
            )
            .await;

        if let Some(trigger) = &self.cache_trigger {
            trigger.subject_upserted(subject.kind, subject.id).await;
        }

        Ok(subject)
    }

    /// Removes a subject together with its reviews.
    pub async fn remove_subject(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        actor.require_user()?;

        let existing = self
            .reader
            .find_subject(id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.writer.delete_subject(id).await?;

        let snapshot = SubjectSnapshot {
            kind: existing.kind,
            title: existing.title.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "subject.remove",
                "subject",
                Some(&id.to_string()),
                Some(&snapshot),
            )
            .await;

        if let Some(trigger) = &self.cache_trigger {
            trigger.subject_deleted(existing.kind, id).await;
        }

        Ok(())
    }

    /// Fetch records for cached ids, keeping the cached order and dropping
    /// ids that no longer resolve.
    async fn hydrate(&self, ids: Vec<Uuid>) -> Result<Vec<SubjectRecord>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.reader.list_subjects_by_ids(&ids).await?;
        let mut by_id: HashMap<Uuid, SubjectRecord> = records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::repos::{AuditRepo, RepoError};
    use crate::cache::{CacheConsumer, CacheRegistry, EventQueue};
    use crate::domain::entities::AuditLogRecord;

    fn subject(id: Uuid, kind: SubjectKind, title: &str) -> SubjectRecord {
        let now = OffsetDateTime::now_utc();
        SubjectRecord {
            id,
            kind,
            title: title.to_string(),
            creator: None,
            released_on: None,
            reviews_count: 0,
            star_average: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[derive(Default)]
    struct CountingCatalogRepo {
        subjects: Vec<SubjectRecord>,
        search_ids: Vec<Uuid>,
        ranking_ids: Vec<Uuid>,
        search_calls: AtomicUsize,
        ranking_calls: AtomicUsize,
        min_reviews_seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl CatalogRepo for CountingCatalogRepo {
        async fn find_subject(&self, id: Uuid) -> Result<Option<SubjectRecord>, RepoError> {
            Ok(self
                .subjects
                .iter()
                .find(|subject| subject.id == id)
                .cloned())
        }

        async fn list_subjects_by_ids(
            &self,
            ids: &[Uuid],
        ) -> Result<Vec<SubjectRecord>, RepoError> {
            Ok(self
                .subjects
                .iter()
                .filter(|subject| ids.contains(&subject.id))
                .cloned()
                .collect())
        }

        async fn search_subject_ids(
            &self,
            _query: &SubjectSearchQuery,
        ) -> Result<Vec<Uuid>, RepoError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.search_ids.clone())
        }

        async fn popular_subject_ids(
            &self,
            _kind: SubjectKind,
            _limit: u32,
        ) -> Result<Vec<Uuid>, RepoError> {
            self.ranking_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ranking_ids.clone())
        }

        async fn top_rated_subject_ids(
            &self,
            _kind: SubjectKind,
            _limit: u32,
            min_reviews: i64,
        ) -> Result<Vec<Uuid>, RepoError> {
            self.ranking_calls.fetch_add(1, Ordering::SeqCst);
            self.min_reviews_seen.lock().unwrap().push(min_reviews);
            Ok(self.ranking_ids.clone())
        }
    }

    #[derive(Default)]
    struct RecordingCatalogWriter {
        updated: Mutex<Vec<UpdateSubjectParams>>,
        deleted: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl CatalogWriteRepo for RecordingCatalogWriter {
        async fn create_subject(
            &self,
            params: CreateSubjectParams,
        ) -> Result<SubjectRecord, RepoError> {
            let now = OffsetDateTime::now_utc();
            Ok(SubjectRecord {
                id: Uuid::new_v4(),
                kind: params.kind,
                title: params.title,
                creator: params.creator,
                released_on: params.released_on,
                reviews_count: 0,
                star_average: 0.0,
                created_at: now,
                updated_at: now,
            })
        }

        async fn update_subject(
            &self,
            params: UpdateSubjectParams,
        ) -> Result<SubjectRecord, RepoError> {
            let now = OffsetDateTime::now_utc();
            let record = SubjectRecord {
                id: params.id,
                kind: SubjectKind::Project,
                title: params.title.clone(),
                creator: params.creator.clone(),
                released_on: params.released_on,
                reviews_count: 0,
                star_average: 0.0,
                created_at: now,
                updated_at: now,
            };
            self.updated.lock().unwrap().push(params);
            Ok(record)
        }

        async fn delete_subject(&self, id: Uuid) -> Result<(), RepoError> {
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullAuditRepo;

    #[async_trait]
    impl AuditRepo for NullAuditRepo {
        async fn append_log(&self, _record: AuditLogRecord) -> Result<(), RepoError> {
            Ok(())
        }

        async fn list_recent(&self, _limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
            Ok(Vec::new())
        }
    }

    fn audit() -> AuditService {
        AuditService::new(Arc::new(NullAuditRepo))
    }

    fn cache_parts() -> (CacheConfig, Arc<ListStore>, Arc<CacheTrigger>) {
        let config = CacheConfig::default();
        let registry = Arc::new(CacheRegistry::new());
        let store = Arc::new(ListStore::new(&config, registry.clone()));
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            store.clone(),
            registry,
            queue.clone(),
        ));
        let trigger = Arc::new(CacheTrigger::new(config.clone(), queue, consumer));
        (config, store, trigger)
    }

    #[tokio::test]
    async fn blank_queries_short_circuit_without_touching_the_repo() {
        let reader = Arc::new(CountingCatalogRepo::default());
        let service = CatalogService::new(
            reader.clone(),
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        );

        let results = service.search_music("   ", 20).await.unwrap();

        assert!(results.is_empty());
        assert_eq!(reader.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hydration_keeps_cached_order_and_skips_vanished_ids() {
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let id3 = Uuid::new_v4();
        let reader = Arc::new(CountingCatalogRepo {
            // id2 vanished between caching and hydration
            subjects: vec![
                subject(id3, SubjectKind::Song, "Gamma"),
                subject(id1, SubjectKind::Song, "Alpha"),
            ],
            search_ids: vec![id1, id2, id3],
            ..CountingCatalogRepo::default()
        });
        let service = CatalogService::new(
            reader,
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        );

        let results = service.search_music("alpha", 20).await.unwrap();

        let titles: Vec<&str> = results.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Gamma"]);
    }

    #[tokio::test]
    async fn repeated_searches_compute_once_within_ttl() {
        let id = Uuid::new_v4();
        let reader = Arc::new(CountingCatalogRepo {
            subjects: vec![subject(id, SubjectKind::Project, "Blue Lines")],
            search_ids: vec![id],
            ..CountingCatalogRepo::default()
        });
        let (config, store, _trigger) = cache_parts();
        let service = CatalogService::new(
            reader.clone(),
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        )
        .with_list_cache(store, config);

        let first = service.search_music("blue lines", 20).await.unwrap();
        let second = service.search_music("LINES blue", 20).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(reader.search_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registering_a_subject_invalidates_rankings_of_its_kind() {
        let id = Uuid::new_v4();
        let reader = Arc::new(CountingCatalogRepo {
            subjects: vec![subject(id, SubjectKind::Podcast, "Talk Talk")],
            ranking_ids: vec![id],
            ..CountingCatalogRepo::default()
        });
        let (config, store, trigger) = cache_parts();
        let service = CatalogService::new(
            reader.clone(),
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        )
        .with_list_cache(store, config)
        .with_cache_trigger(trigger);

        service.popular(SubjectKind::Podcast, 10).await.unwrap();
        service.popular(SubjectKind::Podcast, 10).await.unwrap();
        assert_eq!(reader.ranking_calls.load(Ordering::SeqCst), 1);

        service
            .register_subject(
                &Actor::User(Uuid::new_v4()),
                RegisterSubjectCommand {
                    kind: SubjectKind::Podcast,
                    title: "New Show".to_string(),
                    creator: None,
                    released_on: None,
                },
            )
            .await
            .unwrap();

        service.popular(SubjectKind::Podcast, 10).await.unwrap();
        assert_eq!(reader.ranking_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rankings_of_other_kinds_survive_unrelated_writes() {
        let id = Uuid::new_v4();
        let reader = Arc::new(CountingCatalogRepo {
            subjects: vec![subject(id, SubjectKind::Outfit, "Lookbook")],
            ranking_ids: vec![id],
            ..CountingCatalogRepo::default()
        });
        let (config, store, trigger) = cache_parts();
        let service = CatalogService::new(
            reader.clone(),
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        )
        .with_list_cache(store, config)
        .with_cache_trigger(trigger);

        service.popular(SubjectKind::Outfit, 10).await.unwrap();
        assert_eq!(reader.ranking_calls.load(Ordering::SeqCst), 1);

        service
            .register_subject(
                &Actor::User(Uuid::new_v4()),
                RegisterSubjectCommand {
                    kind: SubjectKind::Event,
                    title: "Festival".to_string(),
                    creator: None,
                    released_on: None,
                },
            )
            .await
            .unwrap();

        service.popular(SubjectKind::Outfit, 10).await.unwrap();
        assert_eq!(reader.ranking_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_merges_missing_fields_from_the_existing_record() {
        let id = Uuid::new_v4();
        let mut existing = subject(id, SubjectKind::Project, "Original Title");
        existing.creator = Some("Original Creator".to_string());
        let reader = Arc::new(CountingCatalogRepo {
            subjects: vec![existing],
            ..CountingCatalogRepo::default()
        });
        let writer = Arc::new(RecordingCatalogWriter::default());
        let service = CatalogService::new(reader, writer.clone(), audit());

        service
            .update_subject(
                &Actor::User(Uuid::new_v4()),
                id,
                UpdateSubjectCommand {
                    title: None,
                    creator: Some("New Creator".to_string()),
                    released_on: None,
                },
            )
            .await
            .unwrap();

        let updated = writer.updated.lock().unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].title, "Original Title");
        assert_eq!(updated[0].creator.as_deref(), Some("New Creator"));
    }

    #[tokio::test]
    async fn catalogue_writes_require_authentication() {
        let service = CatalogService::new(
            Arc::new(CountingCatalogRepo::default()),
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        );

        let err = service
            .remove_subject(&Actor::Anonymous, Uuid::new_v4())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn top_rated_applies_the_configured_review_floor() {
        let reader = Arc::new(CountingCatalogRepo::default());
        let service = CatalogService::new(
            reader.clone(),
            Arc::new(RecordingCatalogWriter::default()),
            audit(),
        )
        .with_min_reviews_for_top_rated(5);

        service.top_rated(SubjectKind::Song, 10).await.unwrap();

        assert_eq!(reader.min_reviews_seen.lock().unwrap().as_slice(), &[5]);
    }
}
