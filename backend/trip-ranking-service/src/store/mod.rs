use crate::error::Result;
use crate::models::{Trip, UserRecord};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Point-in-time source of user and trip documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when no user has this id
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>>;

    /// Full trip corpus snapshot
    async fn list_trips(&self) -> Result<Vec<Trip>>;
}

/// Store over documents held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    users: Vec<UserRecord>,
    trips: Vec<Trip>,
}

impl InMemoryDocumentStore {
    pub fn new(users: Vec<UserRecord>, trips: Vec<Trip>) -> Self {
        Self { users, trips }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn list_trips(&self) -> Result<Vec<Trip>> {
        Ok(self.trips.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    trips: Vec<Trip>,
}

/// Store over a JSON export: `{ "users": [...], "trips": [...] }`.
/// The file is re-read on every call so each request sees the current export.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read(&self) -> Result<Snapshot> {
        let bytes = tokio::fs::read(&self.path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        info!(
            path = %self.path.display(),
            users = snapshot.users.len(),
            trips = snapshot.trips.len(),
            "Loaded document snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl DocumentStore for JsonSnapshotStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .read()
            .await?
            .users
            .into_iter()
            .find(|u| u.id == user_id))
    }

    async fn list_trips(&self) -> Result<Vec<Trip>> {
        Ok(self.read().await?.trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommendError;

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryDocumentStore::new(
            vec![UserRecord {
                id: "u1".to_string(),
                ..Default::default()
            }],
            vec![Trip::new("t1", "u1")],
        );

        assert!(tokio_test::block_on(store.get_user("u1")).unwrap().is_some());
        assert!(tokio_test::block_on(store.get_user("nobody")).unwrap().is_none());
        assert_eq!(tokio_test::block_on(store.list_trips()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_snapshot_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{
                "users": [{"_id": "u1", "travelStyle": "relaxed", "savedTrips": ["t2"]}],
                "trips": [
                    {"_id": "t1", "userId": "u2", "tags": ["beach"], "likes": ["u1"]},
                    {"_id": "t2", "userId": "u2", "createdAt": 1700000000000}
                ]
            }"#,
        )
        .unwrap();

        let store = JsonSnapshotStore::new(&path);

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.travel_style.as_deref(), Some("relaxed"));
        assert_eq!(user.saved_trips, vec!["t2".to_string()]);

        let trips = store.list_trips().await.unwrap();
        assert_eq!(trips.len(), 2);
        assert!(trips[1].created_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("absent.json"));

        let result = store.list_trips().await;

        assert!(matches!(result, Err(RecommendError::Store(_))));
    }
}
