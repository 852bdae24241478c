//! SQL migration definitions for the recipe database.
//!
//! Migrations are applied in order on database open; each records its
//! version in `schema_migrations` so reopening an existing file is a no-op.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: recipes, ingredients, recipe_ingredients",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per distinct recipe; never updated by the crawler
CREATE TABLE IF NOT EXISTS recipes (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    slug                  TEXT NOT NULL UNIQUE,
    name                  TEXT NOT NULL,
    image_url             TEXT NOT NULL DEFAULT '',
    calories              REAL,
    number_of_ingredients INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);

-- Ingredient identities (name + site-local uid)
CREATE TABLE IF NOT EXISTS ingredients (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    uid  INTEGER NOT NULL,
    UNIQUE(name, uid)
);

-- Per-recipe quantities
CREATE TABLE IF NOT EXISTS recipe_ingredients (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    recipe_id     INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
    amount        TEXT NOT NULL DEFAULT '',
    unit          TEXT NOT NULL DEFAULT '',
    notes         TEXT NOT NULL DEFAULT '',
    position      INTEGER NOT NULL,
    UNIQUE(recipe_id, position)
);

CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
