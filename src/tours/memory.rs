use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::model::{tour_id, tour_name};
use super::repo::TourStore;
use crate::db::StoreError;
use crate::query::{read::is_secret, Filter, ReadQuery};

/// Process-local tour store. Keeps insertion order, which stands in for the
/// database's `created_at, id` tie-break.
#[derive(Default)]
pub struct MemoryTourStore {
    tours: RwLock<Vec<Value>>,
}

impl MemoryTourStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Vec<Value>) -> T) -> Result<T, StoreError> {
        let guard = self.tours.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T, StoreError> {
        let mut guard = self.tours.write().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

fn name_taken(tours: &[Value], name: Option<&str>, except: Option<Uuid>) -> bool {
    let Some(name) = name else { return false };
    tours
        .iter()
        .any(|t| tour_name(t) == Some(name) && tour_id(t) != except)
}

fn visible(doc: &Value, id: Uuid) -> bool {
    tour_id(doc) == Some(id) && !is_secret(doc)
}

#[async_trait]
impl TourStore for MemoryTourStore {
    async fn insert(&self, doc: Value) -> Result<Value, StoreError> {
        self.write(|tours| {
            if name_taken(tours, tour_name(&doc), None) {
                return Err(StoreError::Duplicate("name".into()));
            }
            tours.push(doc.clone());
            Ok(doc)
        })?
    }

    async fn find(&self, query: &ReadQuery) -> Result<Vec<Value>, StoreError> {
        self.read(|tours| query.run(tours.iter().cloned()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Value>, StoreError> {
        self.read(|tours| tours.iter().find(|t| visible(t, id)).cloned())
    }

    async fn replace(&self, id: Uuid, doc: Value) -> Result<Option<Value>, StoreError> {
        self.write(|tours| {
            if name_taken(tours, tour_name(&doc), Some(id)) {
                return Err(StoreError::Duplicate("name".into()));
            }
            let Some(slot) = tours.iter_mut().find(|t| visible(t, id)) else {
                return Ok(None);
            };
            *slot = doc.clone();
            Ok(Some(doc))
        })?
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.write(|tours| {
            let before = tours.len();
            tours.retain(|t| !visible(t, id));
            tours.len() != before
        })
    }

    async fn scan(&self, filter: &Filter) -> Result<Vec<Value>, StoreError> {
        self.read(|tours| {
            tours
                .iter()
                .filter(|t| !is_secret(t) && filter.matches(t))
                .cloned()
                .collect()
        })
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        self.write(|tours| {
            let removed = tours.len() as u64;
            tours.clear();
            removed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tour(name: &str, secret: bool) -> Value {
        json!({ "id": Uuid::new_v4(), "name": name, "price": 100, "secret": secret })
    }

    #[tokio::test]
    async fn names_are_unique() {
        let store = MemoryTourStore::new();
        store.insert(tour("Forest", false)).await.unwrap();
        let err = store.insert(tour("Forest", false)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(f) if f == "name"));
    }

    #[tokio::test]
    async fn replace_keeps_own_name_but_rejects_anothers() {
        let store = MemoryTourStore::new();
        let forest = store.insert(tour("Forest", false)).await.unwrap();
        store.insert(tour("Sea", false)).await.unwrap();
        let id = tour_id(&forest).unwrap();

        let mut same = forest.clone();
        same["price"] = json!(200);
        assert!(store.replace(id, same).await.unwrap().is_some());

        let mut clash = forest;
        clash["name"] = json!("Sea");
        assert!(store.replace(id, clash).await.is_err());
    }

    #[tokio::test]
    async fn secret_tours_are_invisible_to_id_operations() {
        let store = MemoryTourStore::new();
        let hidden = store.insert(tour("Hidden", true)).await.unwrap();
        let id = tour_id(&hidden).unwrap();

        assert!(store.find_by_id(id).await.unwrap().is_none());
        assert!(store.replace(id, hidden.clone()).await.unwrap().is_none());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.scan(&Filter::new()).await.unwrap().is_empty());
        assert_eq!(store.find(&ReadQuery::new().including_secret()).await.unwrap().len(), 1);
        assert_eq!(store.delete_all().await.unwrap(), 1);
    }
}
