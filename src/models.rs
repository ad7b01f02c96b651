use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// A news article. `ruta` is either a local public path (`/storage/...`)
/// or a fully-qualified remote URL, never both.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct News {
    pub id: Id,
    pub titulo: String,
    pub sub_titulo: String,
    pub ruta: Option<String>,
    pub link_final: Option<String>,
    pub fecha_hora: Option<DateTime<Utc>>,
    pub user_id: Id,
    pub slug: String,
    pub display: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>, // soft delete marker
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewNews {
    pub titulo: String,
    pub sub_titulo: String,
    pub ruta: Option<String>,
    pub link_final: Option<String>,
    pub fecha_hora: Option<DateTime<Utc>>,
    pub user_id: Id,
    pub slug: String,
    pub display: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateNews {
    pub titulo: Option<String>,
    pub sub_titulo: Option<String>,
    pub ruta: Option<String>,
    pub link_final: Option<String>,
    pub fecha_hora: Option<DateTime<Utc>>,
    pub display: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[schema(value_type = String)]
    pub password: String, // argon2 hash, never serialized
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String, // already hashed by the caller
}

/// One page of repository results, offset paginated.
#[derive(Debug, Clone)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PageOf<T> {
    pub fn last_page(&self) -> u32 {
        if self.total == 0 {
            1
        } else {
            ((self.total + self.per_page as u64 - 1) / self.per_page as u64) as u32
        }
    }

    pub fn pagination_json(&self) -> serde_json::Value {
        let from = if self.items.is_empty() {
            None
        } else {
            Some((self.page as u64 - 1) * self.per_page as u64 + 1)
        };
        let to = from.map(|f| f + self.items.len() as u64 - 1);
        serde_json::json!({
            "current_page": self.page,
            "last_page": self.last_page(),
            "per_page": self.per_page,
            "total": self.total,
            "from": from,
            "to": to,
            "has_more_pages": self.page < self.last_page(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_math() {
        let page: PageOf<u8> = PageOf { items: vec![1, 2, 3], total: 23, page: 1, per_page: 10 };
        assert_eq!(page.last_page(), 3);
        let v = page.pagination_json();
        assert_eq!(v["from"], 1);
        assert_eq!(v["to"], 3);
        assert_eq!(v["has_more_pages"], true);
    }

    #[test]
    fn pagination_empty() {
        let page: PageOf<u8> = PageOf { items: vec![], total: 0, page: 1, per_page: 10 };
        assert_eq!(page.last_page(), 1);
        let v = page.pagination_json();
        assert!(v["from"].is_null());
        assert_eq!(v["has_more_pages"], false);
    }
}
