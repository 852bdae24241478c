//! libSQL storage layer for ingested recipes.
//!
//! The [`Storage`] struct wraps a libSQL database holding three tables:
//! `recipes`, `ingredients` (identity rows) and `recipe_ingredients`
//! (per-recipe quantities). The crawler only ever inserts; [`RecipeStore`]
//! is the narrow interface it depends on.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use harvest_shared::{HarvestError, Ingredient, Recipe, RecipeIngredient, Result};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Ingestion interface used by the crawl driver.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Whether a recipe with this display name is already stored.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Persist a recipe and its ingredients atomically. Returns the new id.
    async fn insert(&self, recipe: &Recipe) -> Result<i64>;
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    /// One transaction at a time on the shared connection.
    write_lock: Mutex<()>,
}

fn storage_err(e: libsql::Error) -> HarvestError {
    HarvestError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db, false, true).await
    }

    /// Open a private in-memory database (tests and dry runs).
    pub async fn open_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db, false, true).await
    }

    /// Open an existing database at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HarvestError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        Self::from_database(db, true, false).await
    }

    async fn from_database(db: Database, readonly: bool, migrate: bool) -> Result<Self> {
        let conn = db.connect().map_err(storage_err)?;
        let storage = Self {
            db,
            conn,
            readonly,
            write_lock: Mutex::new(()),
        };
        if migrate {
            storage.run_migrations().await?;
        }
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    HarvestError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(HarvestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Whether a recipe with `name` exists. Duplicates are keyed on name, not slug.
    pub async fn recipe_exists(&self, name: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM recipes WHERE name = ?1)",
                params![name],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? != 0),
            None => Ok(false),
        }
    }

    /// Insert the recipe row, then each ingredient identity and join row,
    /// all inside one transaction. Any failure rolls the whole recipe back.
    pub async fn insert_recipe(&self, recipe: &Recipe) -> Result<i64> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        match write_recipe(&tx, recipe).await {
            Ok(id) => {
                tx.commit().await.map_err(storage_err)?;
                debug!(recipe = %recipe.name, id, "recipe committed");
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(recipe = %recipe.name, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Fetch a recipe and its ordered ingredients by slug.
    pub async fn get_recipe_by_slug(&self, slug: &str) -> Result<Option<Recipe>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, slug, name, image_url, calories, number_of_ingredients
                 FROM recipes WHERE slug = ?1",
                params![slug],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let mut recipe = row_to_recipe(&row)?;
        if let Some(id) = recipe.id {
            recipe.ingredients = self.ingredients_for_recipe(id).await?;
        }
        Ok(Some(recipe))
    }

    /// Most recently inserted recipes first, without ingredients.
    pub async fn list_recipes(&self, limit: u32) -> Result<Vec<Recipe>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, slug, name, image_url, calories, number_of_ingredients
                 FROM recipes ORDER BY id DESC LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_recipe(&row)?);
        }
        Ok(results)
    }

    /// Total number of stored recipes.
    pub async fn count_recipes(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM recipes", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Ingredients of one recipe, ordered by position.
    pub async fn ingredients_for_recipe(&self, recipe_id: i64) -> Result<Vec<Ingredient>> {
        let mut rows = self
            .conn
            .query(
                "SELECT i.name, i.uid, ri.amount, ri.unit, ri.notes, ri.position
                 FROM recipe_ingredients ri
                 JOIN ingredients i ON i.id = ri.ingredient_id
                 WHERE ri.recipe_id = ?1
                 ORDER BY ri.position ASC",
                params![recipe_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let position: i64 = row.get(5).map_err(storage_err)?;
            results.push(Ingredient {
                name: row.get(0).map_err(storage_err)?,
                uid: row.get(1).map_err(storage_err)?,
                amount: row.get(2).map_err(storage_err)?,
                unit: row.get(3).map_err(storage_err)?,
                notes: row.get(4).map_err(storage_err)?,
                position: u32::try_from(position)
                    .map_err(|_| HarvestError::Storage(format!("invalid position {position}")))?,
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl RecipeStore for Storage {
    async fn exists(&self, name: &str) -> Result<bool> {
        self.recipe_exists(name).await
    }

    async fn insert(&self, recipe: &Recipe) -> Result<i64> {
        self.insert_recipe(recipe).await
    }
}

/// Statements for one recipe; the caller owns the transaction.
async fn write_recipe(conn: &Connection, recipe: &Recipe) -> Result<i64> {
    conn.execute(
        "INSERT INTO recipes (slug, name, image_url, calories, number_of_ingredients)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            recipe.slug.as_str(),
            recipe.name.as_str(),
            recipe.image_url.as_str(),
            recipe.calories,
            recipe.number_of_ingredients as i64,
        ],
    )
    .await
    .map_err(storage_err)?;
    let recipe_id = conn.last_insert_rowid();

    for ingredient in &recipe.ingredients {
        let ingredient_id = upsert_ingredient(conn, ingredient).await?;
        let join = RecipeIngredient::new(recipe_id, ingredient_id, ingredient);
        conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount, unit, notes, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                join.recipe_id,
                join.ingredient_id,
                join.amount.as_str(),
                join.unit.as_str(),
                join.notes.as_str(),
                i64::from(join.position),
            ],
        )
        .await
        .map_err(storage_err)?;
    }

    Ok(recipe_id)
}

/// Id of the `(name, uid)` identity row, creating it on first sight.
async fn upsert_ingredient(conn: &Connection, ingredient: &Ingredient) -> Result<i64> {
    conn.execute(
        "INSERT INTO ingredients (name, uid) VALUES (?1, ?2)
         ON CONFLICT(name, uid) DO NOTHING",
        params![ingredient.name.as_str(), ingredient.uid],
    )
    .await
    .map_err(storage_err)?;

    let mut rows = conn
        .query(
            "SELECT id FROM ingredients WHERE name = ?1 AND uid = ?2",
            params![ingredient.name.as_str(), ingredient.uid],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => row.get::<i64>(0).map_err(storage_err),
        None => Err(HarvestError::Storage(format!(
            "ingredient '{}' missing after upsert",
            ingredient.name
        ))),
    }
}

/// Convert a `recipes` row to a [`Recipe`] without ingredients.
fn row_to_recipe(row: &libsql::Row) -> Result<Recipe> {
    Ok(Recipe {
        id: Some(row.get::<i64>(0).map_err(storage_err)?),
        slug: row.get::<String>(1).map_err(storage_err)?,
        name: row.get::<String>(2).map_err(storage_err)?,
        image_url: row.get::<String>(3).unwrap_or_default(),
        calories: row.get::<f64>(4).ok(),
        number_of_ingredients: row.get::<i64>(5).map_err(storage_err)?.max(0) as usize,
        ingredients: Vec::new(),
    })
}
