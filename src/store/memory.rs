//! In-memory store backed by `DashMap`.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{
    ConditionalWrite, MovieStore, NewUser, PermissionStore, StoreError, StoreResult, TokenStore,
    UserFields, UserStore, WriteOutcome,
};
use crate::auth::{is_expired, Permissions, Scope, Token, TokenHash, User};
use crate::catalog::{Metadata, Movie, MovieFields, MovieQuery, SortDirection};

#[derive(Debug, Clone)]
struct StoredToken {
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

/// Process-local implementation of every store contract.
///
/// Each conditional write runs under the map's per-entry write guard, which
/// makes the version compare and the update one atomic step.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<i64, User>,
    emails: DashMap<String, i64>,
    tokens: DashMap<TokenHash, StoredToken>,
    permissions: DashMap<i64, Permissions>,
    movies: DashMap<i64, Movie>,
    next_user_id: AtomicI64,
    next_movie_id: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.ensure_available()?;

        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        // Reserve the email first; the entry guard is released before the
        // users map is touched so the lock order stays users -> emails.
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        let record = User {
            id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version: 1,
        };
        self.users.insert(id, record.clone());
        debug!(user_id = id, "Inserted user");
        Ok(record)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.ensure_available()?;
        let Some(id) = self.emails.get(email).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &Token) -> StoreResult<()> {
        self.ensure_available()?;
        self.tokens.insert(
            token.hash,
            StoredToken {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
        Ok(())
    }

    async fn lookup_token_owner(
        &self,
        hash: &TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>> {
        self.ensure_available()?;
        let owner = self
            .tokens
            .get(hash)
            .filter(|t| t.scope == scope && !is_expired(t.expiry, now))
            .map(|t| t.user_id);

        Ok(owner.and_then(|id| self.users.get(&id).map(|u| u.value().clone())))
    }

    async fn delete_tokens_for_user(&self, user_id: i64, scope: Scope) -> StoreResult<()> {
        self.ensure_available()?;
        self.tokens
            .retain(|_, t| !(t.user_id == user_id && t.scope == scope));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn load_permissions(&self, user_id: i64) -> StoreResult<Permissions> {
        self.ensure_available()?;
        Ok(self
            .permissions
            .get(&user_id)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }

    async fn add_permissions(&self, user_id: i64, codes: &[&str]) -> StoreResult<()> {
        self.ensure_available()?;
        if !self.users.contains_key(&user_id) {
            return Err(StoreError::RecordNotFound);
        }
        let mut entry = self.permissions.entry(user_id).or_default();
        for code in codes {
            entry.insert(*code);
        }
        Ok(())
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert_movie(&self, fields: MovieFields) -> StoreResult<Movie> {
        self.ensure_available()?;
        let id = self.next_movie_id.fetch_add(1, Ordering::SeqCst) + 1;
        let movie = Movie {
            id,
            created_at: Utc::now(),
            title: fields.title,
            year: fields.year,
            runtime: fields.runtime,
            genres: fields.genres,
            version: 1,
        };
        self.movies.insert(id, movie.clone());
        Ok(movie)
    }

    async fn get_movie(&self, id: i64) -> StoreResult<Option<Movie>> {
        self.ensure_available()?;
        if id < 1 {
            return Ok(None);
        }
        Ok(self.movies.get(&id).map(|m| m.value().clone()))
    }

    async fn delete_movie(&self, id: i64) -> StoreResult<bool> {
        self.ensure_available()?;
        Ok(self.movies.remove(&id).is_some())
    }

    async fn list_movies(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, Metadata)> {
        self.ensure_available()?;
        let column = query.filters.sort_column()?;
        let direction = query.filters.sort_direction();

        let mut matched: Vec<Movie> = self
            .movies
            .iter()
            .filter(|m| query.matches(m.value()))
            .map(|m| m.value().clone())
            .collect();

        matched.sort_by(|a, b| {
            let primary = compare_column(column, a, b);
            let primary = match direction {
                SortDirection::Ascending => primary,
                SortDirection::Descending => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len() as u64;
        let page: Vec<Movie> = matched
            .into_iter()
            .skip(query.filters.offset())
            .take(query.filters.limit())
            .collect();
        let metadata = Metadata::calculate(total, query.filters.page, query.filters.page_size);
        Ok((page, metadata))
    }
}

fn compare_column(column: &str, a: &Movie, b: &Movie) -> CmpOrdering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl ConditionalWrite<MovieFields> for MemoryStore {
    async fn conditional_write(
        &self,
        id: i64,
        expected_version: i32,
        fields: MovieFields,
    ) -> StoreResult<WriteOutcome> {
        self.ensure_available()?;
        let Some(mut movie) = self.movies.get_mut(&id) else {
            return Ok(WriteOutcome::NoMatch);
        };
        if movie.version != expected_version {
            return Ok(WriteOutcome::NoMatch);
        }
        movie.apply(fields);
        movie.version += 1;
        Ok(WriteOutcome::Updated {
            version: movie.version,
        })
    }

    async fn exists(&self, id: i64) -> StoreResult<bool> {
        self.ensure_available()?;
        Ok(self.movies.contains_key(&id))
    }
}

#[async_trait]
impl ConditionalWrite<UserFields> for MemoryStore {
    async fn conditional_write(
        &self,
        id: i64,
        expected_version: i32,
        fields: UserFields,
    ) -> StoreResult<WriteOutcome> {
        self.ensure_available()?;
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(WriteOutcome::NoMatch);
        };
        if user.version != expected_version {
            return Ok(WriteOutcome::NoMatch);
        }

        if user.email != fields.email {
            match self.emails.entry(fields.email.clone()) {
                Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
                Entry::Vacant(entry) => {
                    entry.insert(id);
                }
            }
            self.emails.remove(&user.email);
        }

        user.name = fields.name;
        user.email = fields.email;
        user.password_hash = fields.password_hash;
        user.activated = fields.activated;
        user.version += 1;
        Ok(WriteOutcome::Updated {
            version: user.version,
        })
    }

    async fn exists(&self, id: i64) -> StoreResult<bool> {
        self.ensure_available()?;
        Ok(self.users.contains_key(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Filters, Runtime, MOVIE_SORT_SAFELIST};
    use chrono::Duration;

    fn movie_fields(title: &str, year: i32) -> MovieFields {
        MovieFields {
            title: title.to_string(),
            year,
            runtime: Runtime(100),
            genres: vec!["drama".to_string()],
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            activated: false,
        }
    }

    fn query(sort: &str, page: u64, page_size: u64) -> MovieQuery {
        let mut filters = Filters::new(MOVIE_SORT_SAFELIST);
        filters.sort = sort.to_string();
        filters.page = page;
        filters.page_size = page_size;
        MovieQuery {
            title: String::new(),
            genres: Vec::new(),
            filters,
        }
    }

    #[tokio::test]
    async fn test_stale_version_is_no_match_and_leaves_record_unchanged() {
        let store = MemoryStore::new();
        let movie = store.insert_movie(movie_fields("Heat", 1995)).await.unwrap();
        for _ in 0..3 {
            let current = store.get_movie(movie.id).await.unwrap().unwrap();
            store
                .conditional_write(movie.id, current.version, movie_fields("Heat", 1995))
                .await
                .unwrap();
        }
        let before = store.get_movie(movie.id).await.unwrap().unwrap();
        assert_eq!(before.version, 4);

        let outcome = store
            .conditional_write(movie.id, 3, movie_fields("Cold", 2001))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NoMatch);
        assert_eq!(store.get_movie(movie.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_conditional_write_increments_version() {
        let store = MemoryStore::new();
        let movie = store.insert_movie(movie_fields("Heat", 1995)).await.unwrap();
        assert_eq!(movie.version, 1);

        let outcome = store
            .conditional_write(movie.id, 1, movie_fields("Heat (Director's Cut)", 1995))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Updated { version: 2 });

        let stored = store.get_movie(movie.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Heat (Director's Cut)");
    }

    #[tokio::test]
    async fn test_conditional_write_missing_record() {
        let store = MemoryStore::new();
        let outcome = store
            .conditional_write(42, 1, movie_fields("Ghost", 2000))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NoMatch);
        assert!(!ConditionalWrite::<MovieFields>::exists(&store, 42).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryStore::new();
        store.insert_user(new_user("ada@example.com")).await.unwrap();
        let err = store
            .insert_user(new_user("ada@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateEmail);
    }

    #[tokio::test]
    async fn test_token_lookup_respects_scope_and_expiry() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("ada@example.com")).await.unwrap();
        let now = Utc::now();
        let token = Token::generate(user.id, Duration::hours(1), Scope::Authentication, now);
        store.insert_token(&token).await.unwrap();

        let owner = store
            .lookup_token_owner(&token.hash, Scope::Authentication, now)
            .await
            .unwrap();
        assert_eq!(owner.map(|u| u.id), Some(user.id));

        let wrong_scope = store
            .lookup_token_owner(&token.hash, Scope::Activation, now)
            .await
            .unwrap();
        assert!(wrong_scope.is_none());

        let expired = store
            .lookup_token_owner(&token.hash, Scope::Authentication, now + Duration::hours(1))
            .await
            .unwrap();
        assert!(expired.is_none());
    }

    #[tokio::test]
    async fn test_delete_tokens_for_user_only_touches_scope() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("ada@example.com")).await.unwrap();
        let now = Utc::now();
        let auth = Token::generate(user.id, Duration::hours(1), Scope::Authentication, now);
        let activation = Token::generate(user.id, Duration::hours(1), Scope::Activation, now);
        store.insert_token(&auth).await.unwrap();
        store.insert_token(&activation).await.unwrap();

        store
            .delete_tokens_for_user(user.id, Scope::Activation)
            .await
            .unwrap();

        assert!(store
            .lookup_token_owner(&activation.hash, Scope::Activation, now)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .lookup_token_owner(&auth.hash, Scope::Authentication, now)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_permissions() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("ada@example.com")).await.unwrap();
        assert!(store.load_permissions(user.id).await.unwrap().is_empty());

        store
            .add_permissions(user.id, &["movies:read", "movies:write"])
            .await
            .unwrap();
        let permissions = store.load_permissions(user.id).await.unwrap();
        assert!(permissions.includes("movies:write"));

        assert_eq!(
            store.add_permissions(999, &["movies:read"]).await,
            Err(StoreError::RecordNotFound)
        );
    }

    #[tokio::test]
    async fn test_user_write_changes_email_index() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("ada@example.com")).await.unwrap();
        let mut fields = UserFields::from(&user);
        fields.email = "lovelace@example.com".to_string();
        fields.activated = true;

        let outcome = store.conditional_write(user.id, 1, fields).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Updated { version: 2 });
        assert!(store.get_user_by_email("ada@example.com").await.unwrap().is_none());
        let updated = store
            .get_user_by_email("lovelace@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(updated.activated);
    }

    #[tokio::test]
    async fn test_list_movies_sorting_and_paging() {
        let store = MemoryStore::new();
        store.insert_movie(movie_fields("Casablanca", 1942)).await.unwrap();
        store.insert_movie(movie_fields("Alien", 1979)).await.unwrap();
        store.insert_movie(movie_fields("Brazil", 1985)).await.unwrap();

        let (movies, metadata) = store.list_movies(&query("title", 1, 2)).await.unwrap();
        let titles: Vec<_> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Alien", "Brazil"]);
        assert_eq!(metadata.last_page, 2);
        assert_eq!(metadata.total_records, 3);

        let (movies, _) = store.list_movies(&query("-year", 1, 10)).await.unwrap();
        assert_eq!(movies[0].title, "Brazil");

        let (movies, _) = store.list_movies(&query("id", 2, 2)).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Brazil");
    }

    #[tokio::test]
    async fn test_list_movies_rejects_unsafe_sort() {
        let store = MemoryStore::new();
        let err = store.list_movies(&query("version", 1, 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[tokio::test]
    async fn test_delete_movie() {
        let store = MemoryStore::new();
        let movie = store.insert_movie(movie_fields("Heat", 1995)).await.unwrap();
        assert!(store.delete_movie(movie.id).await.unwrap());
        assert!(!store.delete_movie(movie.id).await.unwrap());
        assert!(store.get_movie(movie.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.load_permissions(1).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.load_permissions(1).await.is_ok());
    }
}
