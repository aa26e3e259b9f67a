//! Search service (spec.md §4.8, C8): text query, person-scoped listing,
//! name-based search, and similar-to-asset, all sharing one deterministic
//! pagination scheme (`(page, page_size)`, ties broken by `asset_id` ASC).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::CoreContext;
use crate::domain::{Asset, Modality};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default)]
pub struct AssetFilters {
    pub taken_after: Option<DateTime<Utc>>,
    pub taken_before: Option<DateTime<Utc>>,
    pub has_person_id: Option<Uuid>,
    pub mime: Option<String>,
}

impl AssetFilters {
    fn matches(&self, asset: &Asset) -> bool {
        if let Some(after) = self.taken_after {
            if asset.taken_at.map(|t| t < after).unwrap_or(true) {
                return false;
            }
        }
        if let Some(before) = self.taken_before {
            if asset.taken_at.map(|t| t > before).unwrap_or(true) {
                return false;
            }
        }
        if let Some(mime) = &self.mime {
            if &asset.mime != mime {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub asset_id: Uuid,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

fn paginate<T>(mut items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as u64;
    let start = (pagination.page * pagination.page_size).min(total) as usize;
    let end = (start as u64 + pagination.page_size).min(total) as usize;
    items = items.drain(start..end).collect();
    Page {
        items,
        total,
        page: pagination.page,
        page_size: pagination.page_size,
    }
}

/// Text query (spec.md §4.8): embed, fetch `k_fetch > page_size` candidates
/// from the vector index, apply metadata filters, then hybrid-rank.
pub async fn text_query(
    ctx: &CoreContext,
    query: &str,
    filters: &AssetFilters,
    pagination: Pagination,
) -> CoreResult<Page<SearchResult>> {
    let embedded = ctx.providers.text_embedder.embed(query).await?;
    let index = ctx
        .vector_indexes
        .get_or_create(Modality::Image, &embedded.model_name, &embedded.model_version, embedded.vector.len() as u32)
        .await;

    let k_fetch = ((pagination.page + 1) * pagination.page_size * 4).max(50);
    let candidates = index.query(&embedded.vector, k_fetch as usize).await?;
    let asset_ids: Vec<Uuid> = candidates.iter().map(|c| c.asset_id).collect();
    let assets = ctx.store.get_assets_by_ids(&asset_ids).await?;
    let assets_by_id: std::collections::HashMap<Uuid, Asset> =
        assets.into_iter().map(|a| (a.id, a)).collect();

    let mut ranked = Vec::new();
    for candidate in candidates {
        let Some(asset) = assets_by_id.get(&candidate.asset_id) else {
            continue;
        };
        if !filters.matches(asset) {
            continue;
        }
        if let Some(person_id) = filters.has_person_id {
            let persons = ctx.store.asset_persons_for_asset(asset.id).await?;
            if !persons.iter().any(|p| p.person_id == person_id) {
                continue;
            }
        }
        let score = hybrid_score(ctx, candidate.score, asset, filters.has_person_id.is_some()).await?;
        ranked.push(SearchResult {
            asset_id: asset.id,
            score,
        });
    }

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
    Ok(paginate(ranked, pagination))
}

async fn hybrid_score(ctx: &CoreContext, cosine_similarity: f32, asset: &Asset, person_matched: bool) -> CoreResult<f32> {
    let person_match_bonus = if person_matched { 1.0 } else { 0.0 };
    let recency_decay = match asset.taken_at {
        Some(taken_at) => {
            let delta_seconds = (Utc::now() - taken_at).num_seconds().max(0) as f32;
            (-delta_seconds / ctx.config.tau).exp()
        }
        None => 0.0,
    };
    Ok(ctx.config.alpha * cosine_similarity + ctx.config.beta * person_match_bonus + ctx.config.gamma * recency_decay)
}

/// Person-scoped listing (spec.md §4.8): all assets a person appears in,
/// ordered by `taken_at` descending, ties broken by `asset_id` ascending.
pub async fn list_by_person(ctx: &CoreContext, person_id: Uuid, pagination: Pagination) -> CoreResult<Page<Asset>> {
    let ids = ctx.store.assets_for_person(person_id).await?;
    let mut assets = ctx.store.get_assets_by_ids(&ids).await?;
    sort_by_taken_at_desc(&mut assets);
    Ok(paginate(assets, pagination))
}

/// Name-based search (spec.md §4.8): case-insensitive substring match on
/// `Person.display_name`, unioned across every matched person's assets.
pub async fn search_by_name(ctx: &CoreContext, query: &str, pagination: Pagination) -> CoreResult<Page<Asset>> {
    let needle = query.to_ascii_lowercase();
    let persons = ctx.store.list_active_persons().await?;
    let matched: Vec<Uuid> = persons
        .into_iter()
        .filter(|p| {
            p.display_name
                .as_ref()
                .map(|name| name.to_ascii_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .map(|p| p.id)
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut assets = Vec::new();
    for person_id in matched {
        for id in ctx.store.assets_for_person(person_id).await? {
            if seen.insert(id) {
                if let Some(asset) = ctx.store.get_asset(id).await? {
                    assets.push(asset);
                }
            }
        }
    }
    sort_by_taken_at_desc(&mut assets);
    Ok(paginate(assets, pagination))
}

/// Similar-to-asset (spec.md §4.8): use the asset's own stored image
/// embedding as the query vector.
pub async fn similar_to_asset(ctx: &CoreContext, asset_id: Uuid, pagination: Pagination) -> CoreResult<Page<SearchResult>> {
    let embeddings = ctx
        .store
        .list_embeddings_for_asset_modality(asset_id, Modality::Image)
        .await?;
    let embedding = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::not_found(format!("asset {asset_id} has no image embedding yet")))?;

    let bytes = ctx
        .artifacts
        .read_verified(std::path::Path::new(&embedding.vector_ref), embedding.checksum)?;
    let query_vector = crate::artifact_store::ArtifactStore::decode_vector(&bytes);

    let index = ctx
        .vector_indexes
        .get_or_create(Modality::Image, &embedding.model_name, &embedding.model_version, embedding.dim)
        .await;
    let k_fetch = ((pagination.page + 1) * pagination.page_size * 4).max(50) as usize;
    let candidates = index.query(&query_vector, k_fetch).await?;

    let mut ranked: Vec<SearchResult> = candidates
        .into_iter()
        .filter(|c| c.asset_id != asset_id)
        .map(|c| SearchResult {
            asset_id: c.asset_id,
            score: c.score,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
    Ok(paginate(ranked, pagination))
}

fn sort_by_taken_at_desc(assets: &mut [Asset]) {
    assets.sort_by(|a, b| {
        b.taken_at
            .cmp(&a.taken_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn paginate_splits_and_reports_total() {
        let items: Vec<u32> = (0..25).collect();
        let page = paginate(items, Pagination { page: 1, page_size: 10 });
        assert_eq!(page.items, (10..20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);
    }

    #[test]
    fn paginate_handles_out_of_range_page() {
        let items: Vec<u32> = (0..5).collect();
        let page = paginate(items, Pagination { page: 3, page_size: 10 });
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
    }

    async fn seed_asset_with_image_embedding(
        ctx: &CoreContext,
        taken_at: Option<DateTime<Utc>>,
        vector: Vec<f32>,
    ) -> Asset {
        let asset = Asset {
            id: Uuid::new_v4(),
            path: format!("/nonexistent/{}.jpg", Uuid::new_v4()),
            sha256: rand::random(),
            perceptual_hash: 0,
            mime: "image/jpeg".to_string(),
            width: 32,
            height: 32,
            orientation: 1,
            taken_at,
            camera: None,
            gps: None,
            size_bytes: 1,
            imported_at: Utc::now(),
            status: crate::domain::AssetStatus::Active,
        };
        ctx.store.upsert_asset(&asset).await.unwrap();

        let mut normalized = vector;
        crate::vector_index::l2_normalize(&mut normalized);
        let model_name = ctx.providers.image_embedder_model_name();
        let path = ctx.artifacts.embedding_path(asset.id, Modality::Image, &model_name);
        let checksum = ctx
            .artifacts
            .write_atomic(&path, &crate::artifact_store::ArtifactStore::encode_vector(&normalized))
            .unwrap();
        let embedding = crate::domain::Embedding {
            id: Uuid::new_v4(),
            asset_id: asset.id,
            modality: Modality::Image,
            model_name: model_name.clone(),
            model_version: "v0".to_string(),
            dim: normalized.len() as u32,
            device: "cpu".to_string(),
            vector_ref: path.display().to_string(),
            checksum,
            created_at: Utc::now(),
        };
        ctx.store.upsert_embedding(&embedding).await.unwrap();
        let index = ctx
            .vector_indexes
            .get_or_create(Modality::Image, &model_name, "v0", normalized.len() as u32)
            .await;
        index.add(asset.id, normalized).await.unwrap();
        asset
    }

    #[tokio::test]
    async fn similar_to_asset_ranks_the_nearest_embedding_first_and_excludes_itself() {
        let tc = test_support::new_context().await;
        let anchor = seed_asset_with_image_embedding(&tc, None, vec![1.0, 0.0, 0.0]).await;
        let near = seed_asset_with_image_embedding(&tc, None, vec![0.98, 0.2, 0.0]).await;
        let far = seed_asset_with_image_embedding(&tc, None, vec![0.0, 0.0, 1.0]).await;

        let page = similar_to_asset(&tc, anchor.id, Pagination { page: 0, page_size: 10 }).await.unwrap();

        assert!(page.items.iter().all(|r| r.asset_id != anchor.id));
        let ids: Vec<Uuid> = page.items.iter().map(|r| r.asset_id).collect();
        assert_eq!(ids[0], near.id);
        assert!(ids.contains(&far.id));
    }

    #[tokio::test]
    async fn similar_to_asset_errors_when_the_asset_has_no_embedding_yet() {
        let tc = test_support::new_context().await;
        let err = similar_to_asset(&tc, Uuid::new_v4(), Pagination { page: 0, page_size: 10 })
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn text_query_finds_assets_embedded_in_the_same_vector_space() {
        let tc = test_support::new_context().await;
        let asset = seed_asset_with_image_embedding(&tc, Some(Utc::now()), vec![0.5, 0.5, 0.0]).await;

        let page = text_query(&tc, "anything", &AssetFilters::default(), Pagination { page: 0, page_size: 10 })
            .await
            .unwrap();

        assert!(page.items.iter().any(|r| r.asset_id == asset.id));
    }

    #[tokio::test]
    async fn search_by_name_matches_case_insensitively_and_unions_assets() {
        let tc = test_support::new_context().await;
        let asset = seed_asset_with_image_embedding(&tc, Some(Utc::now()), vec![1.0, 0.0, 0.0]).await;
        let face = crate::domain::FaceDetection {
            id: Uuid::new_v4(),
            asset_id: asset.id,
            face_index: 0,
            bbox: crate::domain::BoundingBox { x: 0, y: 0, w: 1, h: 1 },
            confidence: 0.9,
            embedding_ref: None,
            embedding_pending: false,
            person_id: None,
            created_at: Utc::now(),
        };
        tc.store.upsert_face(&face).await.unwrap();
        let person = crate::domain::Person {
            id: Uuid::new_v4(),
            display_name: Some("Ada Lovelace".to_string()),
            centroid: vec![0.0],
            member_count: 1,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        tc.store.upsert_person(&person).await.unwrap();
        tc.store.assign_face_to_person(face.id, person.id).await.unwrap();

        let page = search_by_name(&tc, "lovelace", Pagination { page: 0, page_size: 10 }).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, asset.id);

        let empty = search_by_name(&tc, "nobody", Pagination { page: 0, page_size: 10 }).await.unwrap();
        assert!(empty.items.is_empty());
    }
}
