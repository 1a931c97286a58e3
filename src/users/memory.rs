use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewUser, User};
use super::repo::UserStore;
use crate::db::StoreError;

/// Process-local user store for development and tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<Uuid, User>) -> T) -> Result<T, StoreError> {
        let guard = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut HashMap<Uuid, User>) -> T) -> Result<T, StoreError> {
        let mut guard = self.users.write().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        self.write(|users| {
            if users
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(&new.email))
            {
                return Err(StoreError::Duplicate("email".into()));
            }
            let user = User::from_new(new, OffsetDateTime::now_utc());
            users.insert(user.id, user.clone());
            Ok(user)
        })?
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.read(|users| users.get(&id).filter(|u| u.active).cloned())
    }

    async fn find_by_id_including_inactive(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.read(|users| users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.read(|users| {
            users
                .values()
                .find(|u| u.active && u.email.eq_ignore_ascii_case(email))
                .cloned()
        })
    }

    async fn consume_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        self.write(|users| {
            let user = users
                .values_mut()
                .find(|u| u.password_reset_hash.as_deref() == Some(hash))?;
            let live = user.password_reset_expires_at.is_some_and(|exp| exp > now);
            if !live {
                user.password_reset_hash = None;
                user.password_reset_expires_at = None;
                return None;
            }
            if !user.active {
                return None;
            }
            user.password_hash = password_hash.to_string();
            user.password_changed_at = Some(changed_at);
            user.password_reset_hash = None;
            user.password_reset_expires_at = None;
            Some(user.clone())
        })
    }

    async fn list_active(&self) -> Result<Vec<User>, StoreError> {
        self.read(|users| {
            let mut active: Vec<User> = users.values().filter(|u| u.active).cloned().collect();
            active.sort_by_key(|u| u.created_at);
            active
        })
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.write(|users| {
            if let Some(u) = users.get_mut(&id) {
                u.password_hash = password_hash.to_string();
                u.password_changed_at = Some(changed_at);
                u.password_reset_hash = None;
                u.password_reset_expires_at = None;
            }
        })
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.write(|users| {
            if let Some(u) = users.get_mut(&id) {
                u.password_reset_hash = Some(hash.to_string());
                u.password_reset_expires_at = Some(expires_at);
            }
        })
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        self.write(|users| match users.get_mut(&id) {
            Some(u) if u.active => {
                u.active = false;
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::Role;
    use time::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_email_case_insensitively() {
        let store = MemoryUserStore::new();
        store.insert(new_user("ann@example.com")).await.unwrap();
        let err = store.insert(new_user("ANN@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(f) if f == "email"));
    }

    #[tokio::test]
    async fn soft_deleted_users_are_hidden_but_kept() {
        let store = MemoryUserStore::new();
        let ann = store.insert(new_user("ann@example.com")).await.unwrap();
        let bob = store.insert(new_user("bob@example.com")).await.unwrap();

        assert!(store.deactivate(ann.id).await.unwrap());
        assert!(!store.deactivate(ann.id).await.unwrap());

        let listed: Vec<Uuid> = store.list_active().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(listed, vec![bob.id]);
        assert!(store.find_by_id(ann.id).await.unwrap().is_none());
        assert!(store.find_by_email("ann@example.com").await.unwrap().is_none());

        let kept = store.find_by_id_including_inactive(ann.id).await.unwrap().unwrap();
        assert!(!kept.active);
    }

    #[tokio::test]
    async fn reset_token_is_consumed_once() {
        let store = MemoryUserStore::new();
        let ann = store.insert(new_user("ann@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(ann.id, "abc", now + Duration::minutes(10))
            .await
            .unwrap();

        assert!(store
            .consume_reset_token("other", now, "x", now)
            .await
            .unwrap()
            .is_none());

        let updated = store
            .consume_reset_token("abc", now, "new-hash", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, ann.id);
        assert_eq!(updated.password_hash, "new-hash");
        assert_eq!(updated.password_changed_at, Some(now));
        assert!(updated.password_reset_hash.is_none());

        assert!(store
            .consume_reset_token("abc", now, "newer-hash", now)
            .await
            .unwrap()
            .is_none());
        let reloaded = store.find_by_id(ann.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn expired_reset_token_is_cleared_on_lookup() {
        let store = MemoryUserStore::new();
        let ann = store.insert(new_user("ann@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(ann.id, "abc", now - Duration::minutes(1))
            .await
            .unwrap();

        assert!(store
            .consume_reset_token("abc", now, "new-hash", now)
            .await
            .unwrap()
            .is_none());
        let reloaded = store.find_by_id(ann.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "hash");
        assert!(reloaded.password_reset_hash.is_none());
        assert!(reloaded.password_reset_expires_at.is_none());
    }

    #[tokio::test]
    async fn password_change_clears_pending_reset_token() {
        let store = MemoryUserStore::new();
        let ann = store.insert(new_user("ann@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store
            .set_reset_token(ann.id, "abc", now + Duration::minutes(10))
            .await
            .unwrap();

        store.set_password(ann.id, "new-hash", now).await.unwrap();
        let reloaded = store.find_by_id(ann.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "new-hash");
        assert_eq!(reloaded.password_changed_at, Some(now));
        assert!(reloaded.password_reset_hash.is_none());
        assert!(store
            .consume_reset_token("abc", now, "x", now)
            .await
            .unwrap()
            .is_none());
    }
}
