//! `SeaORM` implementation of the [`UpsertService`] trait.

use crate::db::{LinkChanges, ReferenceKind, Store};
use crate::domain::{ContentType, TitleId};
use crate::entities::titles;
use crate::models::{DetailRow, NormalizedRecord, TitleRow};
use crate::services::SyncError;
use crate::services::upsert_service::{UpsertOutcome, UpsertService};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub struct SeaOrmUpsertService {
    store: Store,
}

impl SeaOrmUpsertService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    async fn write_detail(&self, id: TitleId, detail: &DetailRow) -> Result<bool, SyncError> {
        match detail {
            DetailRow::Anime(row) => {
                let existing = self.store.get_anime_detail(id).await?;
                let unchanged = existing.is_some_and(|d| {
                    d.episodes == row.episodes
                        && d.status == row.status
                        && d.format == row.format
                        && d.season == row.season
                });
                if unchanged {
                    return Ok(false);
                }
                self.store.upsert_anime_detail(id, row).await?;
            }
            DetailRow::Manga(row) => {
                let existing = self.store.get_manga_detail(id).await?;
                let unchanged = existing.is_some_and(|d| {
                    d.chapters == row.chapters
                        && d.volumes == row.volumes
                        && d.status == row.status
                        && d.format == row.format
                });
                if unchanged {
                    return Ok(false);
                }
                self.store.upsert_manga_detail(id, row).await?;
            }
        }
        Ok(true)
    }

    /// Makes the title's links of one kind match `names`.
    ///
    /// Stale links are replaced only when the source reported the list; an
    /// absent list leaves existing links alone.
    async fn sync_links(
        &self,
        id: TitleId,
        kind: ReferenceKind,
        names: Option<&[String]>,
    ) -> Result<LinkChanges, SyncError> {
        let Some(names) = names else {
            return Ok(LinkChanges::default());
        };

        let current = self.store.linked_reference_ids(kind, id).await?;
        let mut wanted = BTreeSet::new();
        let mut changes = LinkChanges::default();

        for name in names {
            let reference_id = self.store.ensure_reference(kind, name).await?;
            if wanted.insert(reference_id) && !current.contains(&reference_id) {
                self.store.link_reference(kind, id, reference_id).await?;
                changes.added += 1;
            }
        }

        let stale: Vec<i32> = current.difference(&wanted).copied().collect();
        if !stale.is_empty() {
            let removed = self.store.unlink_references(kind, id, &stale).await?;
            changes.removed = usize::try_from(removed).unwrap_or(usize::MAX);
            debug!(
                title_id = %id,
                kind = kind.label(),
                removed = changes.removed,
                "Removed stale links"
            );
        }

        Ok(changes)
    }
}

/// True when storing `row` would change any content column of `existing`.
fn title_differs(existing: &titles::Model, row: &TitleRow) -> bool {
    existing.title != row.title
        || existing.title_english != row.title_english
        || existing.title_native != row.title_native
        || existing.synopsis != row.synopsis
        || existing.cover_image != row.cover_image
        || existing.score != row.score
        || existing.popularity != row.popularity
        || existing.favourites != row.favourites
        || existing.release_year != row.release_year
        || existing.start_date != row.start_date
}

#[async_trait::async_trait]
impl UpsertService for SeaOrmUpsertService {
    async fn upsert(&self, record: &NormalizedRecord) -> Result<UpsertOutcome, SyncError> {
        let row = &record.title;
        if record.detail.content_type() != row.content_type {
            return Err(SyncError::validation(
                row.external_id,
                "detail row does not match the title's content type",
            ));
        }

        // Step 1: title, keyed on (source, content type, external id).
        let existing = self
            .store
            .find_title(row.source, row.content_type, row.external_id)
            .await?;
        let created = existing.is_none();
        let title_changed = existing.as_ref().is_some_and(|e| title_differs(e, row));

        if created || title_changed {
            let now = Utc::now().to_rfc3339();
            self.store.upsert_title(row, &now).await?;
        }

        let title_id = match existing {
            Some(model) => TitleId::new(model.id),
            None => self
                .store
                .find_title(row.source, row.content_type, row.external_id)
                .await?
                .map(|m| TitleId::new(m.id))
                .ok_or_else(|| {
                    SyncError::Storage(format!(
                        "title {} missing right after upsert",
                        row.external_id
                    ))
                })?,
        };

        // Step 2: the one-to-one detail row.
        let detail_changed = self.write_detail(title_id, &record.detail).await.inspect_err(|e| {
            warn!(
                title_id = %title_id,
                external_id = %row.external_id,
                error = %e,
                "Title written but detail row failed; left for repair"
            );
        })?;

        // Step 3: genres and studios/authors.
        let genre_changes = self
            .sync_links(
                title_id,
                ReferenceKind::Genre(row.content_type),
                record.genre_names.as_deref(),
            )
            .await?;

        let related_kind = match row.content_type {
            ContentType::Anime => ReferenceKind::Studio,
            ContentType::Manga => ReferenceKind::Author,
        };
        let related_changes = self
            .sync_links(title_id, related_kind, record.related_names.as_deref())
            .await?;

        let changed = title_changed
            || (!created && detail_changed)
            || (!created && !(genre_changes.is_empty() && related_changes.is_empty()));

        Ok(UpsertOutcome {
            title_id,
            created,
            changed,
        })
    }

    async fn ping(&self) -> Result<(), SyncError> {
        self.store
            .ping()
            .await
            .map_err(|e| SyncError::Fatal(format!("storage unreachable: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExternalId, SourceKind};
    use crate::models::{AnimeDetailRow, MangaDetailRow};

    async fn store() -> Store {
        Store::new("sqlite::memory:").await.unwrap()
    }

    fn anime_record(id: i32, score: Option<f32>, genres: &[&str]) -> NormalizedRecord {
        NormalizedRecord {
            title: TitleRow {
                source: SourceKind::Anilist,
                content_type: ContentType::Anime,
                external_id: ExternalId::new(id),
                title: format!("Anime {id}"),
                title_english: None,
                title_native: None,
                synopsis: Some("A story.".to_string()),
                cover_image: None,
                score,
                popularity: Some(100),
                favourites: None,
                release_year: Some(2020),
                start_date: Some("2020-01-01".to_string()),
            },
            detail: DetailRow::Anime(AnimeDetailRow {
                episodes: Some(12),
                status: Some("FINISHED".to_string()),
                format: Some("TV".to_string()),
                season: None,
            }),
            genre_names: Some(genres.iter().map(|g| (*g).to_string()).collect()),
            related_names: Some(vec!["Madhouse".to_string()]),
        }
    }

    #[tokio::test]
    async fn second_upsert_is_a_no_op() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());
        let record = anime_record(1, Some(8.5), &["Action", "Drama"]);

        let first = upserter.upsert(&record).await.unwrap();
        assert!(first.created);
        assert!(!first.is_update());

        let before = store.get_title(first.title_id).await.unwrap().unwrap();
        let second = upserter.upsert(&record).await.unwrap();
        assert!(!second.created);
        assert!(!second.changed);
        assert_eq!(second.title_id, first.title_id);

        let after = store.get_title(first.title_id).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(store.count_titles(None).await.unwrap(), 1);
        assert_eq!(
            store
                .linked_reference_names(ReferenceKind::Genre(ContentType::Anime), first.title_id)
                .await
                .unwrap(),
            vec!["Action".to_string(), "Drama".to_string()]
        );
    }

    #[tokio::test]
    async fn changed_score_is_reported_as_update() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());

        upserter.upsert(&anime_record(1, Some(8.5), &["Action"])).await.unwrap();
        let outcome = upserter
            .upsert(&anime_record(1, Some(9.0), &["Action"]))
            .await
            .unwrap();

        assert!(outcome.is_update());
        let title = store.get_title(outcome.title_id).await.unwrap().unwrap();
        assert_eq!(title.score, Some(9.0));
    }

    #[tokio::test]
    async fn shrunk_genre_list_replaces_links() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());

        let first = upserter
            .upsert(&anime_record(1, None, &["Action", "Comedy"]))
            .await
            .unwrap();
        let outcome = upserter.upsert(&anime_record(1, None, &["Action"])).await.unwrap();

        assert!(outcome.is_update());
        let genres = store
            .linked_reference_names(ReferenceKind::Genre(ContentType::Anime), first.title_id)
            .await
            .unwrap();
        assert_eq!(genres, vec!["Action".to_string()]);
    }

    #[tokio::test]
    async fn missing_genre_list_keeps_links() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());

        let first = upserter
            .upsert(&anime_record(1, None, &["Action"]))
            .await
            .unwrap();
        let mut record = anime_record(1, None, &[]);
        record.genre_names = None;
        let outcome = upserter.upsert(&record).await.unwrap();

        assert!(!outcome.changed);
        let genres = store
            .linked_reference_names(ReferenceKind::Genre(ContentType::Anime), first.title_id)
            .await
            .unwrap();
        assert_eq!(genres, vec!["Action".to_string()]);
    }

    #[tokio::test]
    async fn shared_reference_rows_are_not_duplicated() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());

        let a = upserter.upsert(&anime_record(1, None, &["Action"])).await.unwrap();
        let b = upserter.upsert(&anime_record(2, None, &["Action"])).await.unwrap();

        let genre_a = store
            .linked_reference_ids(ReferenceKind::Genre(ContentType::Anime), a.title_id)
            .await
            .unwrap();
        let genre_b = store
            .linked_reference_ids(ReferenceKind::Genre(ContentType::Anime), b.title_id)
            .await
            .unwrap();
        assert_eq!(genre_a, genre_b);
    }

    #[tokio::test]
    async fn manga_genres_are_tracked_separately() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());

        let anime = upserter.upsert(&anime_record(1, None, &["Drama"])).await.unwrap();
        let manga = upserter
            .upsert(&NormalizedRecord {
                title: TitleRow {
                    content_type: ContentType::Manga,
                    ..anime_record(1, None, &[]).title
                },
                detail: DetailRow::Manga(MangaDetailRow {
                    chapters: Some(100),
                    volumes: Some(10),
                    status: None,
                    format: None,
                }),
                genre_names: Some(vec!["Drama".to_string()]),
                related_names: Some(vec!["Some Author".to_string()]),
            })
            .await
            .unwrap();

        assert!(manga.created);
        assert_ne!(anime.title_id, manga.title_id);
        let anime_genres = store
            .linked_reference_ids(ReferenceKind::Genre(ContentType::Anime), anime.title_id)
            .await
            .unwrap();
        let manga_genres = store
            .linked_reference_ids(ReferenceKind::Genre(ContentType::Manga), manga.title_id)
            .await
            .unwrap();
        assert!(anime_genres.is_disjoint(&manga_genres));
        assert_eq!(
            store
                .linked_reference_names(ReferenceKind::Author, manga.title_id)
                .await
                .unwrap(),
            vec!["Some Author".to_string()]
        );
    }

    #[tokio::test]
    async fn mismatched_detail_is_rejected() {
        let store = store().await;
        let upserter = SeaOrmUpsertService::new(store.clone());
        let mut record = anime_record(1, None, &[]);
        record.detail = DetailRow::Manga(MangaDetailRow {
            chapters: None,
            volumes: None,
            status: None,
            format: None,
        });

        let err = upserter.upsert(&record).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert_eq!(store.count_titles(None).await.unwrap(), 0);
    }
}
