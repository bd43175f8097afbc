//! Database schema definitions.

/// Main schema SQL for initializing the database.
///
/// Ownership is expressed through foreign keys: a database owns its
/// properties, views and items; an item owns its values; a page owns its
/// blocks and both ends of its link edges. Item pages are removed
/// explicitly since the item references the page, not the other way round.
pub const SCHEMA: &str = r#"
-- Pages table
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    slug TEXT UNIQUE,
    title TEXT NOT NULL,
    summary TEXT,
    content TEXT NOT NULL DEFAULT '',
    parent_page_id TEXT REFERENCES pages(id) ON DELETE SET NULL,
    icon TEXT,
    cover_image_id TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_page_id);
CREATE INDEX IF NOT EXISTS idx_pages_updated_at ON pages(updated_at);

-- Blocks table
CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    block_type TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_page ON blocks(page_id, position);

-- Link edges derived from block content
CREATE TABLE IF NOT EXISTS page_links (
    source_page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    target_page_id TEXT NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (source_page_id, target_page_id)
);

CREATE INDEX IF NOT EXISTS idx_page_links_target ON page_links(target_page_id);

-- Databases table
CREATE TABLE IF NOT EXISTS databases (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    icon TEXT,
    cover_image_id TEXT,
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Property definitions
CREATE TABLE IF NOT EXISTS database_properties (
    id TEXT PRIMARY KEY,
    database_id TEXT NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    property_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    is_required INTEGER NOT NULL DEFAULT 0,
    default_value TEXT NOT NULL DEFAULT 'null',
    order_index INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (database_id, slug)
);

CREATE INDEX IF NOT EXISTS idx_properties_database ON database_properties(database_id, order_index);

-- Saved views
CREATE TABLE IF NOT EXISTS database_views (
    id TEXT PRIMARY KEY,
    database_id TEXT NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    view_type TEXT NOT NULL,
    filters TEXT NOT NULL DEFAULT '{}',
    sorts TEXT NOT NULL DEFAULT '[]',
    grouping TEXT NOT NULL DEFAULT '{}',
    display_properties TEXT NOT NULL DEFAULT '[]',
    layout_options TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_views_database ON database_views(database_id);

-- Block to embedded view associations
CREATE TABLE IF NOT EXISTS block_views (
    block_id TEXT PRIMARY KEY REFERENCES blocks(id) ON DELETE CASCADE,
    view_id TEXT NOT NULL REFERENCES database_views(id) ON DELETE CASCADE
);

-- Page-backed rows
CREATE TABLE IF NOT EXISTS database_items (
    id TEXT PRIMARY KEY,
    database_id TEXT NOT NULL REFERENCES databases(id) ON DELETE CASCADE,
    page_id TEXT NOT NULL UNIQUE REFERENCES pages(id) ON DELETE CASCADE,
    position INTEGER NOT NULL DEFAULT 0,
    is_archived INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_database ON database_items(database_id, position, created_at);

-- One value per (item, property)
CREATE TABLE IF NOT EXISTS database_values (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL REFERENCES database_items(id) ON DELETE CASCADE,
    property_id TEXT NOT NULL REFERENCES database_properties(id) ON DELETE CASCADE,
    value TEXT NOT NULL,
    is_computed INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE (item_id, property_id)
);

CREATE INDEX IF NOT EXISTS idx_values_property ON database_values(property_id);
"#;

/// Highest timestamp persisted anywhere, used to seed the clock on open.
pub const WATERMARK_QUERY: &str = r#"
SELECT MAX(updated_at) FROM (
    SELECT updated_at FROM pages
    UNION ALL
    SELECT updated_at FROM blocks
    UNION ALL
    SELECT updated_at FROM databases
    UNION ALL
    SELECT updated_at FROM database_properties
    UNION ALL
    SELECT updated_at FROM database_views
    UNION ALL
    SELECT updated_at FROM database_items
    UNION ALL
    SELECT updated_at FROM database_values
)
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
