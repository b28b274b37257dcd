use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::app::error::{ServiceError, ServiceResult};
use crate::domain::category::Category;
use crate::domain::recipe::slugify;
use crate::infra::db::{is_unique_violation, Db};

const CATEGORY_COLUMNS: &str = "id, name, image, slug, created_at";

#[derive(Clone)]
pub struct CategoryService {
    db: Db,
}

impl CategoryService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> ServiceResult<Vec<Category>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM categories ORDER BY name, id",
            CATEGORY_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(category_from_row).collect())
    }

    pub async fn get_by_slug(&self, slug: &str) -> ServiceResult<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {} FROM categories WHERE slug = $1", CATEGORY_COLUMNS))
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(category_from_row))
    }

    pub async fn create(&self, name: &str, image: Option<String>) -> ServiceResult<Category> {
        let name = name.trim();
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ServiceError::validation("category name must contain letters or digits"));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO categories (name, image, slug) VALUES ($1, $2, $3) RETURNING {}",
            CATEGORY_COLUMNS
        ))
        .bind(name)
        .bind(image)
        .bind(&slug)
        .fetch_one(self.db.pool())
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "categories_slug_key") {
                ServiceError::conflict("category already exists")
            } else {
                ServiceError::from(err)
            }
        })?;

        tracing::info!(slug = %slug, "category created");
        Ok(category_from_row(&row))
    }
}

fn category_from_row(row: &PgRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        image: row.get("image"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}
