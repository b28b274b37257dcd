use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::ownership::ensure_owner;
use crate::domain::recipe::{slugify, Difficulty, Instruction, Recipe};
use crate::infra::db::{is_unique_violation, Db};

const MAX_TITLE_LEN: usize = 200;

const RECIPE_SELECT: &str = "\
    SELECT r.id, r.author_id, r.title, r.slug, r.image, r.ingredients, r.instructions, \
           r.servings, r.cooking_time_minutes, r.difficulty, r.created_at, r.updated_at, \
           ARRAY(SELECT l.user_id FROM recipe_likes l \
                 WHERE l.recipe_id = r.id ORDER BY l.created_at, l.user_id) AS likes, \
           ARRAY(SELECT rc.category_id FROM recipe_categories rc \
                 WHERE rc.recipe_id = r.id ORDER BY rc.category_id) AS categories \
    FROM recipes r";

#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub title: String,
    pub image: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<Instruction>,
    pub servings: Option<i32>,
    pub cooking_time_minutes: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub categories: Vec<Uuid>,
}

impl RecipeDraft {
    pub fn validate(&self) -> ServiceResult<()> {
        validate_title(&self.title)?;
        validate_ingredients(&self.ingredients)?;
        validate_instructions(&self.instructions)?;
        validate_numbers(self.servings, self.cooking_time_minutes)
    }
}

/// Partial update. The author and slug are not part of it.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub image: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub instructions: Option<Vec<Instruction>>,
    pub servings: Option<i32>,
    pub cooking_time_minutes: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub categories: Option<Vec<Uuid>>,
}

impl RecipeChanges {
    pub fn validate(&self) -> ServiceResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(ingredients) = &self.ingredients {
            validate_ingredients(ingredients)?;
        }
        if let Some(instructions) = &self.instructions {
            validate_instructions(instructions)?;
        }
        validate_numbers(self.servings, self.cooking_time_minutes)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub author_id: Option<Uuid>,
    pub category_slug: Option<String>,
}

#[derive(Clone)]
pub struct RecipeService {
    db: Db,
}

impl RecipeService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, author_id: Uuid, draft: RecipeDraft) -> ServiceResult<Recipe> {
        draft.validate()?;
        let categories = dedup(draft.categories);

        let mut tx = self.db.pool().begin().await?;
        ensure_categories_exist(&mut tx, &categories).await?;

        let slug = available_slug(&mut tx, &draft.title).await?;
        let recipe_id: Uuid = sqlx::query_scalar(
            "INSERT INTO recipes \
                (author_id, title, slug, image, ingredients, instructions, servings, \
                 cooking_time_minutes, difficulty) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(author_id)
        .bind(draft.title.trim())
        .bind(&slug)
        .bind(draft.image)
        .bind(trimmed(draft.ingredients))
        .bind(Json(draft.instructions))
        .bind(draft.servings.unwrap_or(1))
        .bind(draft.cooking_time_minutes)
        .bind(draft.difficulty.unwrap_or_default().as_db())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err, "recipes_slug_key") {
                ServiceError::conflict("a recipe with this title was just created, try again")
            } else {
                ServiceError::from(err)
            }
        })?;

        replace_categories(&mut tx, recipe_id, &categories).await?;
        tx.commit().await?;

        tracing::info!(recipe_id = %recipe_id, author_id = %author_id, slug = %slug, "recipe created");
        self.require(recipe_id).await
    }

    /// Looks a recipe up by id, or by slug when `key` is not a UUID.
    pub async fn get(&self, key: &str) -> ServiceResult<Option<Recipe>> {
        match Uuid::parse_str(key) {
            Ok(id) => load_recipe(&self.db, id).await,
            Err(_) => {
                let row = sqlx::query(&format!("{} WHERE r.slug = $1", RECIPE_SELECT))
                    .bind(key)
                    .fetch_optional(self.db.pool())
                    .await?;
                row.as_ref().map(recipe_from_row).transpose()
            }
        }
    }

    pub async fn require(&self, recipe_id: Uuid) -> ServiceResult<Recipe> {
        load_recipe(&self.db, recipe_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("no recipe with this id"))
    }

    pub async fn list(
        &self,
        filter: RecipeFilter,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> ServiceResult<Vec<Recipe>> {
        let (cursor_created_at, cursor_id) = match cursor {
            Some((created_at, id)) => (Some(created_at), Some(id)),
            None => (None, None),
        };

        let rows = sqlx::query(&format!(
            "{} \
             WHERE ($1::uuid IS NULL OR r.author_id = $1) \
               AND ($2::text IS NULL OR EXISTS ( \
                   SELECT 1 FROM recipe_categories rc \
                   JOIN categories c ON c.id = rc.category_id \
                   WHERE rc.recipe_id = r.id AND c.slug = $2)) \
               AND ($3::timestamptz IS NULL \
                    OR r.created_at < $3 OR (r.created_at = $3 AND r.id < $4)) \
             ORDER BY r.created_at DESC, r.id DESC \
             LIMIT $5",
            RECIPE_SELECT
        ))
        .bind(filter.author_id)
        .bind(filter.category_slug)
        .bind(cursor_created_at)
        .bind(cursor_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(recipe_from_row).collect()
    }

    pub async fn update(
        &self,
        actor_id: Uuid,
        recipe_id: Uuid,
        changes: RecipeChanges,
    ) -> ServiceResult<Recipe> {
        changes.validate()?;

        let mut tx = self.db.pool().begin().await?;
        let author_id = lock_author(&mut tx, recipe_id).await?;
        ensure_owner(actor_id, author_id, "recipe")?;

        sqlx::query(
            "UPDATE recipes \
             SET title = COALESCE($2, title), \
                 image = COALESCE($3, image), \
                 ingredients = COALESCE($4, ingredients), \
                 instructions = COALESCE($5, instructions), \
                 servings = COALESCE($6, servings), \
                 cooking_time_minutes = COALESCE($7, cooking_time_minutes), \
                 difficulty = COALESCE($8, difficulty), \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(recipe_id)
        .bind(changes.title.map(|title| title.trim().to_string()))
        .bind(changes.image)
        .bind(changes.ingredients.map(trimmed))
        .bind(changes.instructions.map(Json))
        .bind(changes.servings)
        .bind(changes.cooking_time_minutes)
        .bind(changes.difficulty.map(|difficulty| difficulty.as_db()))
        .execute(&mut *tx)
        .await?;

        if let Some(categories) = changes.categories {
            let categories = dedup(categories);
            ensure_categories_exist(&mut tx, &categories).await?;
            replace_categories(&mut tx, recipe_id, &categories).await?;
        }

        tx.commit().await?;
        self.require(recipe_id).await
    }

    pub async fn delete(&self, actor_id: Uuid, recipe_id: Uuid) -> ServiceResult<()> {
        let mut tx = self.db.pool().begin().await?;
        let author_id = lock_author(&mut tx, recipe_id).await?;
        ensure_owner(actor_id, author_id, "recipe")?;

        sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(recipe_id = %recipe_id, author_id = %author_id, "recipe deleted");
        Ok(())
    }
}

pub(crate) async fn load_recipe(db: &Db, recipe_id: Uuid) -> ServiceResult<Option<Recipe>> {
    let row = sqlx::query(&format!("{} WHERE r.id = $1", RECIPE_SELECT))
        .bind(recipe_id)
        .fetch_optional(db.pool())
        .await?;
    row.as_ref().map(recipe_from_row).transpose()
}

fn recipe_from_row(row: &PgRow) -> ServiceResult<Recipe> {
    let difficulty: String = row.get("difficulty");
    let difficulty = Difficulty::from_db(&difficulty)
        .ok_or_else(|| anyhow::anyhow!("unknown recipe difficulty: {}", difficulty))?;
    let instructions: Json<Vec<Instruction>> = row.try_get("instructions")?;

    Ok(Recipe {
        id: row.get("id"),
        author_id: row.get("author_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        image: row.get("image"),
        ingredients: row.get("ingredients"),
        instructions: instructions.0,
        servings: row.get("servings"),
        cooking_time_minutes: row.get("cooking_time_minutes"),
        difficulty,
        likes: row.get("likes"),
        categories: row.get("categories"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn lock_author(tx: &mut Transaction<'_, Postgres>, recipe_id: Uuid) -> ServiceResult<Uuid> {
    let author_id: Option<Uuid> =
        sqlx::query_scalar("SELECT author_id FROM recipes WHERE id = $1 FOR UPDATE")
            .bind(recipe_id)
            .fetch_optional(&mut **tx)
            .await?;
    author_id.ok_or_else(|| ServiceError::not_found("no recipe with this id"))
}

async fn available_slug(tx: &mut Transaction<'_, Postgres>, title: &str) -> ServiceResult<String> {
    let mut base = slugify(title);
    if base.is_empty() {
        base = "recipe".to_string();
    }

    let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM recipes WHERE slug = $1)")
        .bind(&base)
        .fetch_one(&mut **tx)
        .await?;

    if taken {
        Ok(suffixed_slug(&base, Uuid::new_v4()))
    } else {
        Ok(base)
    }
}

fn suffixed_slug(base: &str, nonce: Uuid) -> String {
    let suffix: String = nonce.simple().to_string().chars().take(8).collect();
    format!("{}-{}", base, suffix)
}

async fn ensure_categories_exist(
    tx: &mut Transaction<'_, Postgres>,
    categories: &[Uuid],
) -> ServiceResult<()> {
    if categories.is_empty() {
        return Ok(());
    }

    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ANY($1)")
        .bind(categories)
        .fetch_one(&mut **tx)
        .await?;

    if found != categories.len() as i64 {
        return Err(ServiceError::validation("unknown category"));
    }
    Ok(())
}

async fn replace_categories(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    categories: &[Uuid],
) -> ServiceResult<()> {
    sqlx::query("DELETE FROM recipe_categories WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    if !categories.is_empty() {
        sqlx::query(
            "INSERT INTO recipe_categories (recipe_id, category_id) \
             SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(recipe_id)
        .bind(categories)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn validate_title(title: &str) -> ServiceResult<()> {
    if title.trim().is_empty() {
        return Err(ServiceError::validation("title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ServiceError::validation("title must be at most 200 characters"));
    }
    Ok(())
}

fn validate_ingredients(ingredients: &[String]) -> ServiceResult<()> {
    if ingredients.iter().all(|ingredient| ingredient.trim().is_empty()) {
        return Err(ServiceError::validation("a recipe needs at least one ingredient"));
    }
    Ok(())
}

fn validate_instructions(instructions: &[Instruction]) -> ServiceResult<()> {
    if instructions.is_empty() {
        return Err(ServiceError::validation("a recipe needs at least one instruction"));
    }
    if instructions
        .iter()
        .any(|instruction| instruction.description.trim().is_empty())
    {
        return Err(ServiceError::validation("instruction description cannot be empty"));
    }
    Ok(())
}

fn validate_numbers(servings: Option<i32>, cooking_time_minutes: Option<i32>) -> ServiceResult<()> {
    if matches!(servings, Some(servings) if servings < 1) {
        return Err(ServiceError::validation("servings must be at least 1"));
    }
    if matches!(cooking_time_minutes, Some(minutes) if minutes < 0) {
        return Err(ServiceError::validation("cooking time cannot be negative"));
    }
    Ok(())
}

fn trimmed(ingredients: Vec<String>) -> Vec<String> {
    ingredients
        .into_iter()
        .map(|ingredient| ingredient.trim().to_string())
        .filter(|ingredient| !ingredient.is_empty())
        .collect()
}

fn dedup(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort();
    ids.dedup();
    ids
}
