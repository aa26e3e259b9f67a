//! Person clusterer (spec.md §4.7, C7): incremental per-face assignment and
//! a cancellable, progress-reporting full re-cluster, plus the admin
//! operations on the person graph. Persons hold no direct pointers to faces
//! — only `person_id` foreign keys queried through the store — sidestepping
//! the cyclic Person/FaceDetection references the source modeled with object
//! pointers (spec.md §9).

use chrono::Utc;
use uuid::Uuid;

use crate::artifact_store::ArtifactStore;
use crate::context::CoreContext;
use crate::domain::{FaceDetection, Person};
use crate::error::{CoreError, CoreResult};

/// Recompute the centroid from scratch after this many incremental updates,
/// to bound floating-point drift (spec.md §9).
const CENTROID_RECOMPUTE_INTERVAL: u32 = 500;

fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

/// Read the L2-normalized vector persisted for a face embedding, written by
/// the `face_embed` task handler as a raw little-endian `.f32` artifact
/// (`embedding_ref` holds its path).
fn read_face_vector(_ctx: &CoreContext, face: &FaceDetection) -> CoreResult<Option<Vec<f32>>> {
    let Some(embedding_ref) = &face.embedding_ref else {
        return Ok(None);
    };
    let bytes = std::fs::read(embedding_ref)?;
    Ok(Some(ArtifactStore::decode_vector(&bytes)))
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_normalize(v: &mut [f32]) {
    crate::vector_index::l2_normalize(v)
}

/// Incremental assignment (spec.md §4.7): compare the new face vector
/// against every active person's centroid; assign if the top match clears
/// both the absolute and margin thresholds, else seed a new person.
pub async fn assign_incremental(ctx: &CoreContext, face: &FaceDetection, vector: &[f32]) -> CoreResult<Uuid> {
    let persons = ctx.store.list_active_persons().await?;

    let mut best: Option<(Uuid, f32)> = None;
    let mut second_best_score = f32::NEG_INFINITY;
    for person in &persons {
        let score = inner_product(vector, &person.centroid);
        match best {
            Some((_, best_score)) if score > best_score => {
                second_best_score = best_score;
                best = Some((person.id, score));
            }
            Some(_) => {
                if score > second_best_score {
                    second_best_score = score;
                }
            }
            None => best = Some((person.id, score)),
        }
    }

    let assign_to = match best {
        Some((person_id, s1)) if s1 >= ctx.config.t_assign && (s1 - second_best_score) >= ctx.config.t_margin => {
            Some(person_id)
        }
        _ => None,
    };

    let person_id = match assign_to {
        Some(person_id) => {
            update_centroid_incremental(ctx, person_id, vector).await?;
            person_id
        }
        None => {
            let person = Person {
                id: Uuid::new_v4(),
                display_name: None,
                centroid: vector.to_vec(),
                member_count: 1,
                active: true,
                created_at: now(),
                updated_at: now(),
            };
            ctx.store.upsert_person(&person).await?;
            person.id
        }
    };

    ctx.store.assign_face_to_person(face.id, person_id).await?;
    Ok(person_id)
}

async fn update_centroid_incremental(ctx: &CoreContext, person_id: Uuid, vector: &[f32]) -> CoreResult<()> {
    let mut person = ctx
        .store
        .get_person(person_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("person {person_id} not found")))?;

    let n = person.member_count as f32;
    let mut centroid: Vec<f32> = person
        .centroid
        .iter()
        .zip(vector.iter())
        .map(|(c, v)| (c * n + v) / (n + 1.0))
        .collect();
    l2_normalize(&mut centroid);
    person.centroid = centroid;
    person.member_count += 1;
    person.updated_at = now();

    if person.member_count % CENTROID_RECOMPUTE_INTERVAL == 0 {
        if let Some(recomputed) = recompute_centroid_from_members(ctx, person_id).await? {
            person.centroid = recomputed;
        }
    }

    ctx.store.upsert_person(&person).await
}

/// Recompute a person's centroid from scratch over its current members,
/// bounding the floating-point drift accumulated by repeated incremental
/// updates (spec.md §9).
async fn recompute_centroid_from_members(ctx: &CoreContext, person_id: Uuid) -> CoreResult<Option<Vec<f32>>> {
    let faces = ctx.store.list_faces_for_person(person_id).await?;
    let mut sum: Option<Vec<f32>> = None;
    let mut count = 0u32;
    for face in &faces {
        if let Some(vector) = read_face_vector(ctx, face)? {
            sum = Some(match sum {
                Some(mut acc) => {
                    for (a, v) in acc.iter_mut().zip(vector.iter()) {
                        *a += v;
                    }
                    acc
                }
                None => vector,
            });
            count += 1;
        }
    }
    let Some(mut total) = sum else { return Ok(None) };
    if count > 0 {
        for v in total.iter_mut() {
            *v /= count as f32;
        }
    }
    l2_normalize(&mut total);
    Ok(Some(total))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReclusterOutcome {
    Completed,
    Cancelled,
}

/// Full re-cluster (spec.md §4.7): single-linkage hierarchical agglomerative
/// clustering over inner-product distance at threshold `T_cluster`.
/// Reports progress at least every `progress_step` faces and checks
/// `cancel_requested` at the same cadence; on cancellation, no partial
/// assignment is ever committed to the store (every write happens only after
/// clustering completes in memory), so there is nothing to roll back.
pub async fn full_recluster(
    ctx: &CoreContext,
    task_id: Uuid,
    progress_step: u64,
) -> CoreResult<ReclusterOutcome> {
    let faces = ctx.store.list_all_faces().await?;
    let mut members: Vec<(Uuid, Vec<f32>)> = Vec::new();
    for face in &faces {
        if let Some(vector) = read_face_vector(ctx, face)? {
            members.push((face.id, vector));
        }
    }

    let total = members.len() as u64;
    ctx.store.update_progress(task_id, 0, total).await?;

    // Single-linkage agglomerative clustering: start each face in its own
    // cluster, greedily merge the closest pair while their distance clears
    // `t_cluster`, checking cancellation every `progress_step` merge steps.
    let mut clusters: Vec<Vec<usize>> = (0..members.len()).map(|i| vec![i]).collect();
    let mut processed = 0u64;

    loop {
        if processed % progress_step.max(1) == 0 && ctx.store.is_cancel_requested(task_id).await? {
            return Ok(ReclusterOutcome::Cancelled);
        }

        let mut best: Option<(usize, usize, f32)> = None;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                let similarity = max_linkage_similarity(&clusters[i], &clusters[j], &members);
                if best.map(|(_, _, s)| similarity > s).unwrap_or(true) {
                    best = Some((i, j, similarity));
                }
            }
        }

        match best {
            Some((i, j, similarity)) if similarity >= ctx.config.t_cluster => {
                let merged = {
                    let mut combined = clusters[j].clone();
                    combined.extend(clusters[i].iter().copied());
                    combined
                };
                let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                clusters.remove(hi);
                clusters.remove(lo);
                clusters.push(merged);
            }
            _ => break,
        }

        processed += 1;
        if processed % progress_step.max(1) == 0 {
            ctx.store.update_progress(task_id, processed.min(total), total).await?;
        }
    }

    if ctx.store.is_cancel_requested(task_id).await? {
        return Ok(ReclusterOutcome::Cancelled);
    }

    ctx.store.clear_all_person_assignments().await?;
    for cluster in clusters {
        let mut centroid: Option<Vec<f32>> = None;
        for &idx in &cluster {
            let (_, vector) = &members[idx];
            centroid = Some(match centroid {
                Some(mut acc) => {
                    for (a, v) in acc.iter_mut().zip(vector.iter()) {
                        *a += v;
                    }
                    acc
                }
                None => vector.clone(),
            });
        }
        let Some(mut centroid) = centroid else { continue };
        for v in centroid.iter_mut() {
            *v /= cluster.len() as f32;
        }
        l2_normalize(&mut centroid);

        let person = Person {
            id: Uuid::new_v4(),
            display_name: None,
            centroid,
            member_count: cluster.len() as u32,
            active: true,
            created_at: now(),
            updated_at: now(),
        };
        ctx.store.upsert_person(&person).await?;
        for &idx in &cluster {
            let (face_id, _) = members[idx];
            ctx.store.assign_face_to_person(face_id, person.id).await?;
        }
    }

    ctx.store.update_progress(task_id, total, total).await?;
    Ok(ReclusterOutcome::Completed)
}

fn max_linkage_similarity(a: &[usize], b: &[usize], members: &[(Uuid, Vec<f32>)]) -> f32 {
    a.iter()
        .flat_map(|&i| b.iter().map(move |&j| (i, j)))
        .map(|(i, j)| inner_product(&members[i].1, &members[j].1))
        .fold(f32::NEG_INFINITY, f32::max)
}

/// `rename(person_id, name)` admin operation (spec.md §4.7).
pub async fn rename_person(ctx: &CoreContext, person_id: Uuid, name: String) -> CoreResult<()> {
    let mut person = ctx
        .store
        .get_person(person_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("person {person_id} not found")))?;
    person.display_name = Some(name);
    person.updated_at = now();
    ctx.store.upsert_person(&person).await
}

/// `merge(target_id, source_ids[])` admin operation. Re-running with the
/// same arguments after sources are already merged is a no-op that returns
/// the already-merged state rather than erroring (spec.md §8, scenario 5).
pub async fn merge_persons(ctx: &CoreContext, target_id: Uuid, source_ids: &[Uuid]) -> CoreResult<Person> {
    for &source_id in source_ids {
        if source_id == target_id {
            continue;
        }
        let source = ctx.store.get_person(source_id).await?;
        if source.as_ref().map(|p| !p.active).unwrap_or(true) {
            continue;
        }
        let moved = ctx.store.merge_persons(target_id, source_id).await?;
        let mut target = ctx
            .store
            .get_person(target_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("person {target_id} not found")))?;
        target.member_count += moved as u32;
        target.updated_at = now();
        if let Some(recomputed) = recompute_centroid_from_members(ctx, target_id).await? {
            target.centroid = recomputed;
        }
        ctx.store.upsert_person(&target).await?;
    }
    ctx.store
        .get_person(target_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("person {target_id} not found")))
}

/// `split(person_id, face_id_partition[])` admin operation: each partition
/// becomes a new person with a freshly computed centroid; faces outside any
/// partition stay with the original.
pub async fn split_person(
    ctx: &CoreContext,
    person_id: Uuid,
    partitions: Vec<Vec<Uuid>>,
) -> CoreResult<Vec<Person>> {
    let faces = ctx.store.list_faces_for_person(person_id).await?;
    let mut vectors = std::collections::HashMap::new();
    for face in &faces {
        if let Some(vector) = read_face_vector(ctx, face)? {
            vectors.insert(face.id, vector);
        }
    }

    let mut created = Vec::new();
    for partition in partitions {
        let mut centroid: Option<Vec<f32>> = None;
        let mut member_count = 0u32;
        for face_id in &partition {
            let Some(vector) = vectors.get(face_id) else { continue };
            centroid = Some(match centroid {
                Some(mut acc) => {
                    for (a, v) in acc.iter_mut().zip(vector.iter()) {
                        *a += v;
                    }
                    acc
                }
                None => vector.clone(),
            });
            member_count += 1;
        }
        let Some(mut centroid) = centroid else { continue };
        for v in centroid.iter_mut() {
            *v /= member_count as f32;
        }
        l2_normalize(&mut centroid);

        let new_person = Person {
            id: Uuid::new_v4(),
            display_name: None,
            centroid,
            member_count,
            active: true,
            created_at: now(),
            updated_at: now(),
        };
        ctx.store.upsert_person(&new_person).await?;
        for face_id in &partition {
            ctx.store.assign_face_to_person(*face_id, new_person.id).await?;
        }
        created.push(new_person);
    }

    if let Some(mut original) = ctx.store.get_person(person_id).await? {
        let remaining = recompute_centroid_from_members(ctx, person_id).await?;
        if let Some(centroid) = remaining {
            original.centroid = centroid;
        }
        let remaining_faces = ctx.store.list_faces_for_person(person_id).await?;
        original.member_count = remaining_faces.len() as u32;
        original.updated_at = now();
        ctx.store.upsert_person(&original).await?;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BoundingBox;
    use crate::test_support;

    fn face(asset_id: Uuid, face_index: u32, embedding_ref: Option<String>) -> FaceDetection {
        let embedding_pending = embedding_ref.is_none();
        FaceDetection {
            id: Uuid::new_v4(),
            asset_id,
            face_index,
            bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 },
            confidence: 0.99,
            embedding_ref,
            embedding_pending,
            person_id: None,
            created_at: now(),
        }
    }

    async fn register_face(ctx: &CoreContext, vector: Vec<f32>) -> (FaceDetection, Vec<f32>) {
        let asset_id = Uuid::new_v4();
        let mut normalized = vector;
        l2_normalize(&mut normalized);
        let path = test_support::write_face_vector(ctx, asset_id, 0, normalized.clone());
        let f = face(asset_id, 0, Some(path.display().to_string()));
        ctx.store.upsert_face(&f).await.unwrap();
        (f, normalized)
    }

    #[tokio::test]
    async fn first_face_seeds_a_new_person() {
        let tc = test_support::new_context().await;
        let (f, vector) = register_face(&tc, vec![1.0, 0.0, 0.0]).await;

        let person_id = assign_incremental(&tc, &f, &vector).await.unwrap();
        let person = tc.store.get_person(person_id).await.unwrap().unwrap();
        assert_eq!(person.member_count, 1);
        assert_eq!(person.centroid, vector);
    }

    #[tokio::test]
    async fn near_duplicate_face_joins_the_same_person() {
        let tc = test_support::new_context().await;
        let (f1, v1) = register_face(&tc, vec![1.0, 0.0, 0.0]).await;
        let first = assign_incremental(&tc, &f1, &v1).await.unwrap();

        // Within t_assign/t_margin of the seeded centroid: same direction, tiny perturbation.
        let (f2, v2) = register_face(&tc, vec![0.999, 0.045, 0.0]).await;
        let second = assign_incremental(&tc, &f2, &v2).await.unwrap();

        assert_eq!(first, second);
        let person = tc.store.get_person(first).await.unwrap().unwrap();
        assert_eq!(person.member_count, 2);
    }

    #[tokio::test]
    async fn orthogonal_face_seeds_a_distinct_person() {
        let tc = test_support::new_context().await;
        let (f1, v1) = register_face(&tc, vec![1.0, 0.0, 0.0]).await;
        let first = assign_incremental(&tc, &f1, &v1).await.unwrap();

        let (f2, v2) = register_face(&tc, vec![0.0, 1.0, 0.0]).await;
        let second = assign_incremental(&tc, &f2, &v2).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(tc.store.count_active_persons().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn merge_is_idempotent_on_an_already_merged_source() {
        let tc = test_support::new_context().await;
        let (fa, va) = register_face(&tc, vec![1.0, 0.0, 0.0]).await;
        let target = assign_incremental(&tc, &fa, &va).await.unwrap();
        let (fb, vb) = register_face(&tc, vec![0.0, 1.0, 0.0]).await;
        let source = assign_incremental(&tc, &fb, &vb).await.unwrap();

        let merged_once = merge_persons(&tc, target, &[source]).await.unwrap();
        assert_eq!(merged_once.member_count, 2);

        // Re-merging an already-inactive source must not double-count members.
        let merged_twice = merge_persons(&tc, target, &[source]).await.unwrap();
        assert_eq!(merged_twice.member_count, 2);
    }

    #[tokio::test]
    async fn split_partitions_faces_into_new_persons_and_shrinks_the_original() {
        let tc = test_support::new_context().await;
        let (f1, v1) = register_face(&tc, vec![1.0, 0.0, 0.0]).await;
        let original = assign_incremental(&tc, &f1, &v1).await.unwrap();
        let (f2, v2) = register_face(&tc, vec![0.999, 0.02, 0.0]).await;
        assign_incremental(&tc, &f2, &v2).await.unwrap();
        let (f3, v3) = register_face(&tc, vec![0.999, 0.03, 0.0]).await;
        assign_incremental(&tc, &f3, &v3).await.unwrap();

        let split = split_person(&tc, original, vec![vec![f2.id], vec![f3.id]]).await.unwrap();
        assert_eq!(split.len(), 2);

        let remaining = tc.store.get_person(original).await.unwrap().unwrap();
        assert_eq!(remaining.member_count, 1);
        let remaining_faces = tc.store.list_faces_for_person(original).await.unwrap();
        assert_eq!(remaining_faces.len(), 1);
        assert_eq!(remaining_faces[0].id, f1.id);
    }

    #[tokio::test]
    async fn full_recluster_groups_close_faces_and_separates_distant_ones() {
        let tc = test_support::new_context().await;
        let (f1, _) = register_face(&tc, vec![1.0, 0.0, 0.0]).await;
        let (f2, _) = register_face(&tc, vec![0.99, 0.05, 0.0]).await;
        let (f3, _) = register_face(&tc, vec![0.0, 0.0, 1.0]).await;

        let task_id = Uuid::new_v4();
        let outcome = full_recluster(&tc, task_id, 10).await.unwrap();
        assert_eq!(outcome, ReclusterOutcome::Completed);

        let persons = tc.store.list_active_persons().await.unwrap();
        assert_eq!(persons.len(), 2, "the two near-identical faces should share a person");

        let f1_person = tc.store.get_face(f1.id).await.unwrap().unwrap().person_id;
        let f2_person = tc.store.get_face(f2.id).await.unwrap().unwrap().person_id;
        let f3_person = tc.store.get_face(f3.id).await.unwrap().unwrap().person_id;
        assert_eq!(f1_person, f2_person);
        assert_ne!(f1_person, f3_person);
    }

    #[tokio::test]
    async fn full_recluster_honors_a_cancellation_request() {
        let tc = test_support::new_context().await;
        register_face(&tc, vec![1.0, 0.0, 0.0]).await;
        register_face(&tc, vec![0.0, 1.0, 0.0]).await;

        let now_ts = chrono::Utc::now();
        let task = crate::domain::Task {
            id: Uuid::new_v4(),
            payload: crate::domain::TaskType::PersonRecluster { scope: crate::domain::ReclusterScope::Full },
            state: crate::domain::TaskState::Running,
            priority: 0,
            retry_count: 0,
            max_retries: 1,
            last_error: None,
            scheduled_at: now_ts,
            created_at: now_ts,
            started_at: Some(now_ts),
            finished_at: None,
            progress_current: None,
            progress_total: None,
            cancel_requested: false,
            idempotency_key: None,
        };
        tc.store.enqueue_task(&task).await.unwrap();
        tc.store.request_cancel(task.id).await.unwrap();

        let outcome = full_recluster(&tc, task.id, 1).await.unwrap();
        assert_eq!(outcome, ReclusterOutcome::Cancelled);
        assert_eq!(tc.store.count_active_persons().await.unwrap(), 0);
    }
}
