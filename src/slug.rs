use chrono::Utc;

use crate::repo::{NewsRepo, RepoResult};

/// Titles are truncated before slugification so slugs stay short.
const TITLE_LIMIT: usize = 100;
/// After this many collisions the timestamp fallback guarantees termination.
const MAX_COLLISIONS: u32 = 1000;

fn fold_char(c: char) -> Option<char> {
    match c {
        'á' | 'à' | 'ä' | 'â' => Some('a'),
        'é' | 'è' | 'ë' | 'ê' => Some('e'),
        'í' | 'ì' | 'ï' | 'î' => Some('i'),
        'ó' | 'ò' | 'ö' | 'ô' => Some('o'),
        'ú' | 'ù' | 'ü' | 'û' => Some('u'),
        'ñ' => Some('n'),
        'ç' => Some('c'),
        c if c.is_ascii_alphanumeric() => Some(c),
        _ => None,
    }
}

/// Lowercase, accent-folded, hyphen-separated ASCII token sequence.
/// Idempotent: slugifying a slug returns itself.
pub fn slugify(title: &str) -> String {
    let truncated: String = title.chars().take(TITLE_LIMIT).collect();
    let mut slug = String::with_capacity(truncated.len());
    let mut pending_sep = false;
    for c in truncated.to_lowercase().chars() {
        match fold_char(c) {
            Some(c) => {
                if pending_sep && !slug.is_empty() {
                    slug.push('-');
                }
                pending_sep = false;
                slug.push(c);
            }
            None => pending_sep = true,
        }
    }
    slug
}

/// Derive a slug from `title` that no record (active or soft-deleted) holds.
///
/// Check-then-return only: two concurrent calls can race past the existence
/// check with the same candidate. The repository's unique constraint is the
/// backstop; callers map that violation to a conflict response.
pub async fn unique_slug(repo: &dyn NewsRepo, title: &str) -> RepoResult<String> {
    let base = {
        let s = slugify(title);
        if s.is_empty() {
            format!("noticia-{}", Utc::now().timestamp())
        } else {
            s
        }
    };

    let mut slug = base.clone();
    let mut counter: u32 = 1;
    while repo.slug_exists(&slug).await? {
        if counter > MAX_COLLISIONS {
            slug = format!("{}-{}-{}", base, Utc::now().timestamp(), counter);
            break;
        }
        slug = format!("{}-{}", base, counter);
        counter += 1;
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNews;
    use crate::repo::inmem::InMemRepo;

    fn temp_repo() -> (InMemRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("NOTICIERO_DATA_DIR", dir.path());
        (InMemRepo::new(), dir)
    }

    fn news_with_slug(slug: &str) -> NewNews {
        NewNews {
            titulo: "t".into(),
            sub_titulo: "s".into(),
            ruta: None,
            link_final: None,
            fecha_hora: None,
            user_id: 1,
            slug: slug.into(),
            display: true,
        }
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Hello, World! 2024"), "hello-world-2024");
    }

    #[test]
    fn slugify_accents() {
        assert_eq!(slugify("Año nuevo en León"), "ano-nuevo-en-leon");
    }

    #[test]
    fn slugify_idempotent() {
        for title in ["Hello, World! 2024", "  --Tres__ espacios  ", "Café"] {
            let once = slugify(title);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn slugify_symbols_only_is_empty() {
        assert_eq!(slugify("!!! ??? ***"), "");
    }

    #[test]
    fn slugify_truncates_long_titles() {
        let title = "a".repeat(300);
        assert_eq!(slugify(&title).len(), 100);
    }

    #[actix_web::test]
    #[serial_test::serial]
    async fn unique_slug_increments_on_collision() {
        let (repo, _dir) = temp_repo();
        assert_eq!(unique_slug(&repo, "Hello, World! 2024").await.unwrap(), "hello-world-2024");
        repo.create_news(news_with_slug("hello-world-2024")).await.unwrap();
        assert_eq!(unique_slug(&repo, "Hello, World! 2024").await.unwrap(), "hello-world-2024-1");
        repo.create_news(news_with_slug("hello-world-2024-1")).await.unwrap();
        assert_eq!(unique_slug(&repo, "Hello, World! 2024").await.unwrap(), "hello-world-2024-2");
    }

    #[actix_web::test]
    #[serial_test::serial]
    async fn unique_slug_considers_soft_deleted() {
        let (repo, _dir) = temp_repo();
        let created = repo.create_news(news_with_slug("mi-noticia")).await.unwrap();
        repo.soft_delete_news(created.id).await.unwrap();
        assert_eq!(unique_slug(&repo, "Mi Noticia").await.unwrap(), "mi-noticia-1");
    }

    #[actix_web::test]
    #[serial_test::serial]
    async fn empty_title_falls_back_to_timestamp() {
        let (repo, _dir) = temp_repo();
        let slug = unique_slug(&repo, "¡¡¡!!!").await.unwrap();
        assert!(slug.starts_with("noticia-"), "got {slug}");
    }
}
