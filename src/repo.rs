use async_trait::async_trait;

use crate::models::*;

pub const PER_PAGE: u32 = 10;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    /// Unique-slug violation. The application-level existence check is only a
    /// fast path; this is the correctness backstop.
    #[error("conflict")]
    Conflict,
    #[error("not deleted")]
    NotDeleted,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait NewsRepo: Send + Sync {
    /// Active records, `fecha_hora` desc then `created_at` desc.
    async fn list_news(&self, page: u32) -> RepoResult<PageOf<News>>;
    /// Most recent visible records (`display = true`), capped at `limit`.
    async fn top_visible(&self, limit: usize) -> RepoResult<Vec<News>>;
    async fn get_news(&self, id: Id) -> RepoResult<News>;
    async fn find_by_slug(&self, slug: &str) -> RepoResult<News>;
    async fn create_news(&self, new: NewNews) -> RepoResult<News>;
    /// Partial update; the slug is never regenerated.
    async fn update_news(&self, id: Id, upd: UpdateNews) -> RepoResult<News>;
    async fn soft_delete_news(&self, id: Id) -> RepoResult<News>;
    async fn restore_news(&self, id: Id) -> RepoResult<News>;
    /// Removes the record outright. Callers handle any file cleanup.
    async fn hard_delete_news(&self, id: Id) -> RepoResult<News>;
    /// Soft-deleted records only, `deleted_at` desc.
    async fn list_trashed(&self, page: u32) -> RepoResult<PageOf<News>>;
    /// Existence check across active and soft-deleted records.
    async fn slug_exists(&self, slug: &str) -> RepoResult<bool>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn update_user_name(&self, id: Id, name: &str) -> RepoResult<User>;
}

pub trait Repo: NewsRepo + UserRepo {}

impl<T> Repo for T where T: NewsRepo + UserRepo {}

fn paginate<T: Clone>(mut items: Vec<T>, page: u32, per_page: u32) -> PageOf<T> {
    let total = items.len() as u64;
    let page = page.max(1);
    // page is caller-controlled; the offset must not overflow u32
    let start = (page as u64 - 1) * per_page as u64;
    let items = if start >= total {
        Vec::new()
    } else {
        let start = start as usize;
        items.drain(start..(start + per_page as usize).min(total as usize)).collect()
    };
    PageOf { items, total, page, per_page }
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        news: HashMap<Id, News>,
        users: HashMap<Id, User>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("NOTICIERO_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        fn sorted_active(state: &State) -> Vec<News> {
            let mut v: Vec<News> = state
                .news
                .values()
                .filter(|n| n.deleted_at.is_none())
                .cloned()
                .collect();
            v.sort_by(|a, b| {
                b.fecha_hora
                    .cmp(&a.fecha_hora)
                    .then(b.created_at.cmp(&a.created_at))
            });
            v
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl NewsRepo for InMemRepo {
        async fn list_news(&self, page: u32) -> RepoResult<PageOf<News>> {
            let s = self.state.read().unwrap();
            Ok(paginate(Self::sorted_active(&s), page, PER_PAGE))
        }

        async fn top_visible(&self, limit: usize) -> RepoResult<Vec<News>> {
            let s = self.state.read().unwrap();
            let mut v = Self::sorted_active(&s);
            v.retain(|n| n.display);
            v.truncate(limit);
            Ok(v)
        }

        async fn get_news(&self, id: Id) -> RepoResult<News> {
            let s = self.state.read().unwrap();
            s.news
                .get(&id)
                .filter(|n| n.deleted_at.is_none())
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn find_by_slug(&self, slug: &str) -> RepoResult<News> {
            let s = self.state.read().unwrap();
            s.news
                .values()
                .find(|n| n.slug == slug && n.deleted_at.is_none())
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn create_news(&self, new: NewNews) -> RepoResult<News> {
            let mut s = self.state.write().unwrap();
            // Unique constraint stand-in: covers active and soft-deleted rows.
            if s.news.values().any(|n| n.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let news = News {
                id,
                titulo: new.titulo,
                sub_titulo: new.sub_titulo,
                ruta: new.ruta,
                link_final: new.link_final,
                fecha_hora: new.fecha_hora,
                user_id: new.user_id,
                slug: new.slug,
                display: new.display,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            s.news.insert(id, news.clone());
            drop(s);
            self.persist();
            Ok(news)
        }

        async fn update_news(&self, id: Id, upd: UpdateNews) -> RepoResult<News> {
            let mut s = self.state.write().unwrap();
            let news = s
                .news
                .get_mut(&id)
                .filter(|n| n.deleted_at.is_none())
                .ok_or(RepoError::NotFound)?;
            if let Some(titulo) = upd.titulo {
                news.titulo = titulo;
            }
            if let Some(sub_titulo) = upd.sub_titulo {
                news.sub_titulo = sub_titulo;
            }
            if let Some(ruta) = upd.ruta {
                news.ruta = Some(ruta);
            }
            if let Some(link_final) = upd.link_final {
                news.link_final = Some(link_final);
            }
            if let Some(fecha_hora) = upd.fecha_hora {
                news.fecha_hora = Some(fecha_hora);
            }
            if let Some(display) = upd.display {
                news.display = display;
            }
            news.updated_at = Utc::now();
            let updated = news.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn soft_delete_news(&self, id: Id) -> RepoResult<News> {
            let mut s = self.state.write().unwrap();
            let news = s
                .news
                .get_mut(&id)
                .filter(|n| n.deleted_at.is_none())
                .ok_or(RepoError::NotFound)?;
            news.deleted_at = Some(Utc::now());
            let deleted = news.clone();
            drop(s);
            self.persist();
            Ok(deleted)
        }

        async fn restore_news(&self, id: Id) -> RepoResult<News> {
            let mut s = self.state.write().unwrap();
            let news = s.news.get_mut(&id).ok_or(RepoError::NotFound)?;
            if news.deleted_at.is_none() {
                return Err(RepoError::NotDeleted);
            }
            news.deleted_at = None;
            news.updated_at = Utc::now();
            let restored = news.clone();
            drop(s);
            self.persist();
            Ok(restored)
        }

        async fn hard_delete_news(&self, id: Id) -> RepoResult<News> {
            let mut s = self.state.write().unwrap();
            let removed = s.news.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(removed)
        }

        async fn list_trashed(&self, page: u32) -> RepoResult<PageOf<News>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<News> = s
                .news
                .values()
                .filter(|n| n.deleted_at.is_some())
                .cloned()
                .collect();
            v.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
            Ok(paginate(v, page, PER_PAGE))
        }

        async fn slug_exists(&self, slug: &str) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.news.values().any(|n| n.slug == slug))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().find(|u| u.email == email).cloned())
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                name: new.name,
                email: new.email,
                password: new.password,
                created_at: now,
                updated_at: now,
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn update_user_name(&self, id: Id, name: &str) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.name = name.to_string();
            user.updated_at = Utc::now();
            let updated = user.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    const NEWS_COLS: &str = "id, titulo, sub_titulo, ruta, link_final, fecha_hora, user_id, slug, display, created_at, updated_at, deleted_at";

    fn map_db_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => {
                // Pattern-match the known unique-slug constraint for a
                // specific 409; everything else stays opaque.
                if db.message().contains("news_slug_unique") {
                    RepoError::Conflict
                } else {
                    RepoError::Internal(db.message().to_string())
                }
            }
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[async_trait]
    impl NewsRepo for PgRepo {
        async fn list_news(&self, page: u32) -> RepoResult<PageOf<News>> {
            let page = page.max(1);
            let offset = (page as i64 - 1) * PER_PAGE as i64;
            let items = sqlx::query_as::<_, News>(&format!(
                "SELECT {NEWS_COLS} FROM news WHERE deleted_at IS NULL \
                 ORDER BY fecha_hora DESC NULLS LAST, created_at DESC LIMIT $1 OFFSET $2"
            ))
            .bind(PER_PAGE as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE deleted_at IS NULL")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_db_err)?;
            Ok(PageOf { items, total: total as u64, page, per_page: PER_PAGE })
        }

        async fn top_visible(&self, limit: usize) -> RepoResult<Vec<News>> {
            sqlx::query_as::<_, News>(&format!(
                "SELECT {NEWS_COLS} FROM news WHERE deleted_at IS NULL AND display = TRUE \
                 ORDER BY fecha_hora DESC NULLS LAST, created_at DESC LIMIT $1"
            ))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn get_news(&self, id: Id) -> RepoResult<News> {
            sqlx::query_as::<_, News>(&format!(
                "SELECT {NEWS_COLS} FROM news WHERE id = $1 AND deleted_at IS NULL"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn find_by_slug(&self, slug: &str) -> RepoResult<News> {
            sqlx::query_as::<_, News>(&format!(
                "SELECT {NEWS_COLS} FROM news WHERE slug = $1 AND deleted_at IS NULL"
            ))
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn create_news(&self, new: NewNews) -> RepoResult<News> {
            sqlx::query_as::<_, News>(&format!(
                "INSERT INTO news (titulo, sub_titulo, ruta, link_final, fecha_hora, user_id, slug, display) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {NEWS_COLS}"
            ))
            .bind(&new.titulo)
            .bind(&new.sub_titulo)
            .bind(&new.ruta)
            .bind(&new.link_final)
            .bind(new.fecha_hora)
            .bind(new.user_id)
            .bind(&new.slug)
            .bind(new.display)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn update_news(&self, id: Id, upd: UpdateNews) -> RepoResult<News> {
            sqlx::query_as::<_, News>(&format!(
                "UPDATE news SET \
                   titulo = COALESCE($2, titulo), \
                   sub_titulo = COALESCE($3, sub_titulo), \
                   ruta = COALESCE($4, ruta), \
                   link_final = COALESCE($5, link_final), \
                   fecha_hora = COALESCE($6, fecha_hora), \
                   display = COALESCE($7, display), \
                   updated_at = now() \
                 WHERE id = $1 AND deleted_at IS NULL RETURNING {NEWS_COLS}"
            ))
            .bind(id)
            .bind(upd.titulo)
            .bind(upd.sub_titulo)
            .bind(upd.ruta)
            .bind(upd.link_final)
            .bind(upd.fecha_hora)
            .bind(upd.display)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn soft_delete_news(&self, id: Id) -> RepoResult<News> {
            sqlx::query_as::<_, News>(&format!(
                "UPDATE news SET deleted_at = now() \
                 WHERE id = $1 AND deleted_at IS NULL RETURNING {NEWS_COLS}"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn restore_news(&self, id: Id) -> RepoResult<News> {
            // Distinguish "missing" from "not deleted" for the 400 case.
            let existing = sqlx::query_as::<_, News>(&format!(
                "SELECT {NEWS_COLS} FROM news WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
            if existing.deleted_at.is_none() {
                return Err(RepoError::NotDeleted);
            }
            sqlx::query_as::<_, News>(&format!(
                "UPDATE news SET deleted_at = NULL, updated_at = now() \
                 WHERE id = $1 RETURNING {NEWS_COLS}"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn hard_delete_news(&self, id: Id) -> RepoResult<News> {
            sqlx::query_as::<_, News>(&format!(
                "DELETE FROM news WHERE id = $1 RETURNING {NEWS_COLS}"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn list_trashed(&self, page: u32) -> RepoResult<PageOf<News>> {
            let page = page.max(1);
            let offset = (page as i64 - 1) * PER_PAGE as i64;
            let items = sqlx::query_as::<_, News>(&format!(
                "SELECT {NEWS_COLS} FROM news WHERE deleted_at IS NOT NULL \
                 ORDER BY deleted_at DESC LIMIT $1 OFFSET $2"
            ))
            .bind(PER_PAGE as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)?;
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE deleted_at IS NOT NULL")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_db_err)?;
            Ok(PageOf { items, total: total as u64, page, per_page: PER_PAGE })
        }

        async fn slug_exists(&self, slug: &str) -> RepoResult<bool> {
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM news WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_err)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
            sqlx::query_as::<_, User>(
                "SELECT id, name, email, password, created_at, updated_at FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, name, email, password, created_at, updated_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (name, email, password) VALUES ($1, $2, $3) \
                 RETURNING id, name, email, password, created_at, updated_at",
            )
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }

        async fn update_user_name(&self, id: Id, name: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "UPDATE users SET name = $2, updated_at = now() WHERE id = $1 \
                 RETURNING id, name, email, password, created_at, updated_at",
            )
            .bind(id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_basic_window() {
        let page = paginate((1..=25).collect::<Vec<i32>>(), 2, 10);
        assert_eq!(page.items, (11..=20).collect::<Vec<i32>>());
        assert_eq!(page.total, 25);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn paginate_survives_extreme_page_numbers() {
        let page = paginate((1..=25).collect::<Vec<i32>>(), u32::MAX, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 25);
        assert_eq!(page.page, u32::MAX);
    }

    #[cfg(feature = "inmem-store")]
    #[actix_web::test]
    #[serial_test::serial]
    async fn list_news_accepts_extreme_page_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("NOTICIERO_DATA_DIR", dir.path());
        let repo = inmem::InMemRepo::new();
        let page = repo.list_news(u32::MAX).await.unwrap();
        assert!(page.items.is_empty());
        let page = repo.list_trashed(u32::MAX).await.unwrap();
        assert!(page.items.is_empty());
    }
}
