//! In-memory repository implementations.
//!
//! Backed by mutex-guarded maps, these implement the same traits as the
//! Postgres repositories and mirror their semantics (embedding preservation
//! on upsert, one-sided unlink, result merging, FIFO listing). They exist so
//! the worker and its tests can run without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use uuid::Uuid;

use recap_core::{
    DocLevel, Document, DocumentFilter, DocumentRepository, Error, ProcessingTask, Result,
    ScoredDocument, TaskConfig, TaskRepository, TaskStatus, TaskUpdate, UpsertDocumentRequest,
};

/// In-memory DocumentRepository.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<HashMap<Uuid, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Document>> {
        self.inner.lock().expect("document store mutex poisoned")
    }
}

/// Render a metadata value the way Postgres `->>` does: strings bare,
/// everything else as its JSON text.
fn metadata_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_filter(doc: &Document, filter: &DocumentFilter) -> bool {
    if let Some(id) = filter.id {
        if doc.id != id {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if &doc.category != category {
            return false;
        }
    }
    if let Some(level) = filter.level {
        if doc.level != level {
            return false;
        }
    }
    if let Some(text) = &filter.text {
        if !doc.content.to_lowercase().contains(&text.to_lowercase()) {
            return false;
        }
    }
    for (key, value) in &filter.metadata {
        match doc.metadata.get(key) {
            Some(v) if metadata_text(v) == *value => {}
            _ => return false,
        }
    }
    true
}

/// Cosine similarity between two vectors; 0.0 when either has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl DocumentRepository for MemoryDocumentStore {
    async fn upsert(&self, request: UpsertDocumentRequest) -> Result<Document> {
        let mut docs = self.lock();

        let doc = match docs.get(&request.id) {
            Some(existing) => Document {
                id: request.id,
                title: request.title,
                category: request.category,
                level: request.level,
                metadata: request.metadata,
                content: request.content,
                // absent embedding keeps the stored vector
                embedding: request.embedding.or_else(|| existing.embedding.clone()),
                summary_uuids: existing.summary_uuids.clone(),
                source_uuids: existing.source_uuids.clone(),
                created_at: existing.created_at,
            },
            None => Document {
                id: request.id,
                title: request.title,
                category: request.category,
                level: request.level,
                metadata: request.metadata,
                content: request.content,
                embedding: request.embedding,
                summary_uuids: Vec::new(),
                source_uuids: Vec::new(),
                created_at: Utc::now(),
            },
        };

        docs.insert(request.id, doc.clone());
        Ok(doc)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // Dangling link references in other documents are left in place.
        Ok(self.lock().remove(&id).is_some())
    }

    async fn search(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let docs = self.lock();
        let mut matched: Vec<Document> = docs
            .values()
            .filter(|doc| matches_filter(doc, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matched)
    }

    async fn nearest_by_embedding(
        &self,
        query: &Vector,
        limit: i64,
        category: Option<&str>,
        level: Option<DocLevel>,
    ) -> Result<Vec<ScoredDocument>> {
        let docs = self.lock();
        let mut scored: Vec<ScoredDocument> = docs
            .values()
            .filter(|doc| category.is_none_or(|c| doc.category == c))
            .filter(|doc| level.is_none_or(|l| doc.level == l))
            .filter_map(|doc| {
                let embedding = doc.embedding.as_ref()?;
                Some(ScoredDocument {
                    similarity: cosine_similarity(query.as_slice(), embedding.as_slice()),
                    document: doc.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(0) as usize);
        Ok(scored)
    }

    async fn link(&self, source_id: Uuid, summary_id: Uuid) -> Result<()> {
        let mut docs = self.lock();
        if let Some(source) = docs.get_mut(&source_id) {
            if !source.summary_uuids.contains(&summary_id) {
                source.summary_uuids.push(summary_id);
            }
        }
        if let Some(summary) = docs.get_mut(&summary_id) {
            if !summary.source_uuids.contains(&source_id) {
                summary.source_uuids.push(source_id);
            }
        }
        Ok(())
    }

    async fn unlink_summary(&self, source_id: Uuid, summary_id: Uuid) -> Result<()> {
        // One-sided: the summary's source_uuids entry survives.
        if let Some(source) = self.lock().get_mut(&source_id) {
            source.summary_uuids.retain(|id| *id != summary_id);
        }
        Ok(())
    }

    async fn clear_summaries(&self, source_id: Uuid) -> Result<()> {
        if let Some(source) = self.lock().get_mut(&source_id) {
            source.summary_uuids.clear();
        }
        Ok(())
    }
}

/// In-memory TaskRepository.
///
/// A monotonic sequence number breaks created_at ties so FIFO order is
/// stable even when tasks are enqueued within the same millisecond.
#[derive(Default)]
pub struct MemoryTaskQueue {
    inner: Mutex<TaskQueueState>,
}

#[derive(Default)]
struct TaskQueueState {
    tasks: HashMap<Uuid, (ProcessingTask, u64)>,
    next_seq: u64,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TaskQueueState> {
        self.inner.lock().expect("task queue mutex poisoned")
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskQueue {
    async fn enqueue(&self, doc_id: Uuid, config: &TaskConfig) -> Result<ProcessingTask> {
        let mut state = self.lock();
        let now = Utc::now();

        let task = match state.tasks.get(&doc_id) {
            Some((existing, _)) => ProcessingTask {
                doc_id,
                status: TaskStatus::Created,
                config: config.clone(),
                // prior results stay until processing overwrites them
                results: existing.results.clone(),
                created_at: existing.created_at,
                updated_at: now,
            },
            None => ProcessingTask {
                doc_id,
                status: TaskStatus::Created,
                config: config.clone(),
                results: Default::default(),
                created_at: now,
                updated_at: now,
            },
        };

        let seq = match state.tasks.get(&doc_id) {
            Some((_, seq)) => *seq,
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                seq
            }
        };

        state.tasks.insert(doc_id, (task.clone(), seq));
        Ok(task)
    }

    async fn update(&self, doc_id: Uuid, update: &TaskUpdate) -> Result<ProcessingTask> {
        let mut state = self.lock();
        let (task, _) = state
            .tasks
            .get_mut(&doc_id)
            .ok_or(Error::TaskNotFound(doc_id))?;

        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(results) = &update.results {
            task.results.merge(results.clone());
        }
        if let Some(config) = &update.config {
            task.config = config.clone();
        }
        task.updated_at = Utc::now();

        Ok(task.clone())
    }

    async fn get(&self, doc_id: Uuid) -> Result<Option<ProcessingTask>> {
        Ok(self.lock().tasks.get(&doc_id).map(|(task, _)| task.clone()))
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<ProcessingTask>> {
        let state = self.lock();
        let mut matched: Vec<(ProcessingTask, u64)> = state
            .tasks
            .values()
            .filter(|(task, _)| task.status == status)
            .cloned()
            .collect();
        matched.sort_by(|(a, sa), (b, sb)| a.created_at.cmp(&b.created_at).then(sa.cmp(sb)));
        Ok(matched.into_iter().map(|(task, _)| task).collect())
    }

    async fn delete(&self, doc_id: Uuid) -> Result<bool> {
        Ok(self.lock().tasks.remove(&doc_id).is_some())
    }

    async fn configure_created(&self, config: &TaskConfig) -> Result<u64> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut released = 0u64;

        for (task, _) in state.tasks.values_mut() {
            if task.status == TaskStatus::Created {
                task.status = TaskStatus::Queued;
                task.config = config.clone();
                task.updated_at = now;
                released += 1;
            }
        }

        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::TaskResults;
    use serde_json::json;

    fn doc_request(id: Uuid, content: &str) -> UpsertDocumentRequest {
        UpsertDocumentRequest {
            id,
            title: None,
            category: "notes".to_string(),
            level: DocLevel::L0,
            metadata: json!({}),
            content: content.to_string(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_insert_and_get() {
        let store = MemoryDocumentStore::new();
        let id = Uuid::now_v7();

        store.upsert(doc_request(id, "hello")).await.unwrap();
        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.content, "hello");
        assert!(doc.summary_uuids.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_preserves_embedding_when_absent() {
        let store = MemoryDocumentStore::new();
        let id = Uuid::now_v7();

        let mut req = doc_request(id, "v1");
        req.embedding = Some(Vector::from(vec![1.0, 0.0, 0.0]));
        store.upsert(req).await.unwrap();

        // Re-upsert without an embedding keeps the stored vector.
        store.upsert(doc_request(id, "v2")).await.unwrap();
        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.content, "v2");
        assert!(doc.embedding.is_some());

        // Re-upsert WITH an embedding replaces it.
        let mut req = doc_request(id, "v3");
        req.embedding = Some(Vector::from(vec![0.0, 1.0, 0.0]));
        store.upsert(req).await.unwrap();
        let doc = store.get(id).await.unwrap().unwrap();
        assert_eq!(doc.embedding.unwrap().as_slice(), &[0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_upsert_preserves_links_and_created_at() {
        let store = MemoryDocumentStore::new();
        let source = Uuid::now_v7();
        let summary = Uuid::now_v7();

        store.upsert(doc_request(source, "source")).await.unwrap();
        store.upsert(doc_request(summary, "summary")).await.unwrap();
        store.link(source, summary).await.unwrap();

        let before = store.get(source).await.unwrap().unwrap();
        store.upsert(doc_request(source, "rewritten")).await.unwrap();
        let after = store.get(source).await.unwrap().unwrap();

        assert_eq!(after.summary_uuids, vec![summary]);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_link_is_mutual_and_idempotent() {
        let store = MemoryDocumentStore::new();
        let source = Uuid::now_v7();
        let summary = Uuid::now_v7();

        store.upsert(doc_request(source, "source")).await.unwrap();
        store.upsert(doc_request(summary, "summary")).await.unwrap();

        store.link(source, summary).await.unwrap();
        store.link(source, summary).await.unwrap();

        let source_doc = store.get(source).await.unwrap().unwrap();
        let summary_doc = store.get(summary).await.unwrap().unwrap();
        assert_eq!(source_doc.summary_uuids, vec![summary]);
        assert_eq!(summary_doc.source_uuids, vec![source]);
    }

    #[tokio::test]
    async fn test_unlink_summary_is_one_sided() {
        let store = MemoryDocumentStore::new();
        let source = Uuid::now_v7();
        let summary = Uuid::now_v7();

        store.upsert(doc_request(source, "source")).await.unwrap();
        store.upsert(doc_request(summary, "summary")).await.unwrap();
        store.link(source, summary).await.unwrap();

        store.unlink_summary(source, summary).await.unwrap();

        let source_doc = store.get(source).await.unwrap().unwrap();
        let summary_doc = store.get(summary).await.unwrap().unwrap();
        assert!(source_doc.summary_uuids.is_empty());
        // The summary still records its provenance.
        assert_eq!(summary_doc.source_uuids, vec![source]);
    }

    #[tokio::test]
    async fn test_clear_summaries_is_one_sided() {
        let store = MemoryDocumentStore::new();
        let source = Uuid::now_v7();
        let s1 = Uuid::now_v7();
        let s2 = Uuid::now_v7();

        for (id, content) in [(source, "source"), (s1, "s1"), (s2, "s2")] {
            store.upsert(doc_request(id, content)).await.unwrap();
        }
        store.link(source, s1).await.unwrap();
        store.link(source, s2).await.unwrap();

        store.clear_summaries(source).await.unwrap();

        let source_doc = store.get(source).await.unwrap().unwrap();
        assert!(source_doc.summary_uuids.is_empty());
        let s1_doc = store.get(s1).await.unwrap().unwrap();
        assert_eq!(s1_doc.source_uuids, vec![source]);
    }

    #[tokio::test]
    async fn test_delete_leaves_dangling_references() {
        let store = MemoryDocumentStore::new();
        let source = Uuid::now_v7();
        let summary = Uuid::now_v7();

        store.upsert(doc_request(source, "source")).await.unwrap();
        store.upsert(doc_request(summary, "summary")).await.unwrap();
        store.link(source, summary).await.unwrap();

        assert!(store.delete(summary).await.unwrap());
        assert!(!store.delete(summary).await.unwrap());

        // The source still references the deleted summary.
        let source_doc = store.get(source).await.unwrap().unwrap();
        assert_eq!(source_doc.summary_uuids, vec![summary]);
        assert!(store.get(summary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_filters_are_anded() {
        let store = MemoryDocumentStore::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        let mut req = doc_request(a, "quarterly report on revenue");
        req.metadata = json!({"date": "2024-01-15"});
        store.upsert(req).await.unwrap();

        let mut req = doc_request(b, "quarterly report on churn");
        req.category = "archive".to_string();
        store.upsert(req).await.unwrap();

        let filter = DocumentFilter {
            text: Some("QUARTERLY".to_string()),
            category: Some("notes".to_string()),
            metadata: vec![("date".to_string(), "2024-01-15".to_string())],
            ..Default::default()
        };
        let found = store.search(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity_and_skips_unembedded() {
        let store = MemoryDocumentStore::new();
        let close = Uuid::now_v7();
        let far = Uuid::now_v7();
        let none = Uuid::now_v7();

        let mut req = doc_request(close, "close");
        req.embedding = Some(Vector::from(vec![1.0, 0.0]));
        store.upsert(req).await.unwrap();

        let mut req = doc_request(far, "far");
        req.embedding = Some(Vector::from(vec![0.0, 1.0]));
        store.upsert(req).await.unwrap();

        store.upsert(doc_request(none, "no embedding")).await.unwrap();

        let query = Vector::from(vec![1.0, 0.1]);
        let results = store
            .nearest_by_embedding(&query, 10, None, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, close);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_nearest_respects_category_filter() {
        let store = MemoryDocumentStore::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        let mut req = doc_request(a, "a");
        req.embedding = Some(Vector::from(vec![1.0, 0.0]));
        store.upsert(req).await.unwrap();

        let mut req = doc_request(b, "b");
        req.category = "archive".to_string();
        req.embedding = Some(Vector::from(vec![1.0, 0.0]));
        store.upsert(req).await.unwrap();

        let query = Vector::from(vec![1.0, 0.0]);
        let results = store
            .nearest_by_embedding(&query, 10, Some("archive"), None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, b);
    }

    #[tokio::test]
    async fn test_enqueue_resets_status_replaces_config_keeps_results() {
        let queue = MemoryTaskQueue::new();
        let doc_id = Uuid::now_v7();

        let first_config = TaskConfig {
            model_l: Some("alpha".to_string()),
            ..Default::default()
        };
        queue.enqueue(doc_id, &first_config).await.unwrap();

        // Simulate a completed run.
        queue
            .update(
                doc_id,
                &TaskUpdate::status(TaskStatus::Done).with_results(TaskResults {
                    sum_l: Some("old summary".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let second_config = TaskConfig {
            model_l: Some("beta".to_string()),
            ..Default::default()
        };
        let task = queue.enqueue(doc_id, &second_config).await.unwrap();

        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.config.model_l.as_deref(), Some("beta"));
        // Stale results survive until the next run overwrites them.
        assert_eq!(task.results.sum_l.as_deref(), Some("old summary"));
    }

    #[tokio::test]
    async fn test_list_by_status_is_fifo() {
        let queue = MemoryTaskQueue::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::now_v7()).collect();

        for id in &ids {
            queue.enqueue(*id, &TaskConfig::default()).await.unwrap();
            queue
                .update(*id, &TaskUpdate::status(TaskStatus::Queued))
                .await
                .unwrap();
        }

        let queued = queue.list_by_status(TaskStatus::Queued).await.unwrap();
        let listed: Vec<Uuid> = queued.iter().map(|t| t.doc_id).collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn test_update_merges_results_across_phases() {
        let queue = MemoryTaskQueue::new();
        let doc_id = Uuid::now_v7();
        queue.enqueue(doc_id, &TaskConfig::default()).await.unwrap();

        queue
            .update(
                doc_id,
                &TaskUpdate::default().with_results(TaskResults {
                    sum_l: Some("left".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let task = queue
            .update(
                doc_id,
                &TaskUpdate::default().with_results(TaskResults {
                    sum_r: Some("right".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(task.results.sum_l.as_deref(), Some("left"));
        assert_eq!(task.results.sum_r.as_deref(), Some("right"));
    }

    #[tokio::test]
    async fn test_update_missing_task_errors() {
        let queue = MemoryTaskQueue::new();
        let err = queue
            .update(Uuid::now_v7(), &TaskUpdate::status(TaskStatus::Done))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_configure_created_releases_only_created() {
        let queue = MemoryTaskQueue::new();
        let created = Uuid::now_v7();
        let done = Uuid::now_v7();

        queue.enqueue(created, &TaskConfig::default()).await.unwrap();
        queue.enqueue(done, &TaskConfig::default()).await.unwrap();
        queue
            .update(done, &TaskUpdate::status(TaskStatus::Done))
            .await
            .unwrap();

        let config = TaskConfig {
            model_l: Some("alpha".to_string()),
            model_r: Some("beta".to_string()),
            ..Default::default()
        };
        let released = queue.configure_created(&config).await.unwrap();
        assert_eq!(released, 1);

        let task = queue.get(created).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.config.model_l.as_deref(), Some("alpha"));

        let untouched = queue.get(done).await.unwrap().unwrap();
        assert_eq!(untouched.status, TaskStatus::Done);
    }
}
