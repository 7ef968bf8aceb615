//! Optimistic concurrency control for versioned records.
//!
//! A write names the version the caller last read. The store applies it in
//! one conditional statement; there is no lock held between read and write.

use thiserror::Error;
use tracing::debug;

use crate::store::{ConditionalWrite, StoreError, WriteOutcome};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The record changed (or vanished) since the caller read it
    #[error("Unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("The requested resource could not be found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply `fields` to record `id` if it is still at `expected_version`.
///
/// Returns the new version. Any miss is reported as
/// [`ConflictError::EditConflict`], whether the version moved or the record
/// was deleted.
pub async fn commit<F, S>(
    store: &S,
    id: i64,
    expected_version: i32,
    fields: F,
) -> Result<i32, ConflictError>
where
    F: Send + 'static,
    S: ConditionalWrite<F> + ?Sized,
{
    match store.conditional_write(id, expected_version, fields).await? {
        WriteOutcome::Updated { version } => {
            debug!(id = id, version = version, "Committed versioned write");
            Ok(version)
        }
        WriteOutcome::NoMatch => {
            debug!(id = id, expected_version = expected_version, "Edit conflict");
            Err(ConflictError::EditConflict)
        }
    }
}

/// Like [`commit`], but tells a deleted record apart from a moved version.
///
/// The existence check is a separate read, so a concurrent delete racing
/// the check can still surface as an edit conflict.
pub async fn commit_checked<F, S>(
    store: &S,
    id: i64,
    expected_version: i32,
    fields: F,
) -> Result<i32, ConflictError>
where
    F: Send + 'static,
    S: ConditionalWrite<F> + ?Sized,
{
    if !store.exists(id).await? {
        return Err(ConflictError::NotFound);
    }
    commit(store, id, expected_version, fields).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MovieFields, Runtime};
    use crate::store::{MemoryStore, MovieStore};
    use std::sync::Arc;

    fn fields(title: &str) -> MovieFields {
        MovieFields {
            title: title.to_string(),
            year: 1995,
            runtime: Runtime(170),
            genres: vec!["crime".to_string()],
        }
    }

    #[tokio::test]
    async fn test_commit_success() {
        let store = MemoryStore::new();
        let movie = store.insert_movie(fields("Heat")).await.unwrap();
        let version = commit(&store, movie.id, 1, fields("Heat 2")).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let movie = store.insert_movie(fields("Heat")).await.unwrap();
        commit(&store, movie.id, 1, fields("Heat 2")).await.unwrap();

        let err = commit(&store, movie.id, 1, fields("Heat 3")).await.unwrap_err();
        assert_eq!(err, ConflictError::EditConflict);
        let stored = store.get_movie(movie.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Heat 2");
    }

    #[tokio::test]
    async fn test_missing_record_is_uniform_conflict() {
        let store = MemoryStore::new();
        let err = commit(&store, 99, 1, fields("Ghost")).await.unwrap_err();
        assert_eq!(err, ConflictError::EditConflict);
    }

    #[tokio::test]
    async fn test_checked_commit_distinguishes_not_found() {
        let store = MemoryStore::new();
        let err = commit_checked(&store, 99, 1, fields("Ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, ConflictError::NotFound);

        let movie = store.insert_movie(fields("Heat")).await.unwrap();
        let err = commit_checked(&store, movie.id, 7, fields("Heat 2"))
            .await
            .unwrap_err();
        assert_eq!(err, ConflictError::EditConflict);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        let movie = store.insert_movie(fields("Heat")).await.unwrap();
        store.set_unavailable(true);
        let err = commit(&store, movie.id, 1, fields("Heat 2")).await.unwrap_err();
        assert!(matches!(err, ConflictError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_exactly_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let movie = store.insert_movie(fields("Heat")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let title = format!("writer-{}", i);
                (title.clone(), commit(&*store, movie.id, 1, fields(&title)).await)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let (title, result) = handle.await.unwrap();
            match result {
                Ok(version) => {
                    assert_eq!(version, 2);
                    winners.push(title);
                }
                Err(e) => assert_eq!(e, ConflictError::EditConflict),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = store.get_movie(movie.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.title, winners[0]);
    }
}
