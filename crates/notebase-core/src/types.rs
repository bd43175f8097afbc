//! Core domain types for the notebase workspace.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::NotebaseError;

/// Free-form JSON object used for configs, payloads and view options.
pub type JsonObject = serde_json::Map<String, Value>;

/// Generate a fresh entity identifier.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

// ---------------------------------------------------------------------------
// Pages and blocks
// ---------------------------------------------------------------------------

/// A page in the workspace tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Unique identifier (ULID).
    pub id: String,

    /// Optional human-readable slug, unique when present.
    pub slug: Option<String>,

    /// Page title.
    pub title: String,

    /// Short summary.
    pub summary: Option<String>,

    /// Freeform body text.
    pub content: String,

    /// Parent page, if nested.
    pub parent_page_id: Option<String>,

    pub icon: Option<String>,

    pub cover_image_id: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub is_archived: bool,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,

    /// Last update timestamp (Unix millis).
    pub updated_at: u64,
}

/// Fields for creating a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPage {
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_page_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub cover_image_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewPage {
    /// A root page with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the parent page.
    pub fn with_parent(mut self, parent_page_id: impl Into<String>) -> Self {
        self.parent_page_id = Some(parent_page_id.into());
        self
    }
}

/// Partial page update. Absent fields are left untouched.
///
/// `parent_page_id` distinguishes "absent" (`None`) from an explicit JSON
/// `null` (`Some(None)`), which detaches the page to the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "double_option::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_page_id: Option<Option<String>>,
    #[serde(default)]
    pub is_archived: Option<bool>,
}

/// Closed set of block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Markdown,
    Heading,
    PageLink,
    DatabaseView,
    Divider,
    Image,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Heading => "heading",
            Self::PageLink => "page_link",
            Self::DatabaseView => "database_view",
            Self::Divider => "divider",
            Self::Image => "image",
        }
    }
}

impl FromStr for BlockType {
    type Err = NotebaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "heading" => Ok(Self::Heading),
            "page_link" => Ok(Self::PageLink),
            "database_view" => Ok(Self::DatabaseView),
            "divider" => Ok(Self::Divider),
            "image" => Ok(Self::Image),
            other => Err(NotebaseError::invalid_argument(format!(
                "unknown block type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub page_id: String,
    /// Dense zero-based index within the page.
    pub position: u32,
    pub block_type: BlockType,
    pub data: JsonObject,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A block as submitted for a full replace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlock {
    /// Keep this id instead of generating one.
    #[serde(default)]
    pub id: Option<String>,
    pub block_type: BlockType,
    #[serde(default)]
    pub data: JsonObject,
}

impl NewBlock {
    pub fn new(block_type: BlockType, data: JsonObject) -> Self {
        Self {
            id: None,
            block_type,
            data,
        }
    }

    /// Page ids this block links to, in payload order, possibly repeated.
    ///
    /// `page_link` blocks contribute `data.target_page_id`; every block may
    /// carry `data.linked_page_ids`. Empty and non-string entries are skipped.
    pub fn link_targets(&self) -> Vec<&str> {
        let mut targets = Vec::new();

        if self.block_type == BlockType::PageLink {
            if let Some(Value::String(target)) = self.data.get("target_page_id") {
                if !target.is_empty() {
                    targets.push(target.as_str());
                }
            }
        }

        if let Some(Value::Array(ids)) = self.data.get("linked_page_ids") {
            targets.extend(
                ids.iter()
                    .filter_map(Value::as_str)
                    .filter(|id| !id.is_empty()),
            );
        }

        targets
    }

    /// The view embedded by a `database_view` block.
    pub fn embedded_view(&self) -> Option<&str> {
        if self.block_type != BlockType::DatabaseView {
            return None;
        }
        self.data
            .get("view_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// A page together with its blocks and inbound links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDocument {
    pub page: Page,
    pub blocks: Vec<Block>,
    /// Pages linking here, most recently updated first.
    pub backlinks: Vec<Page>,
}

// ---------------------------------------------------------------------------
// Databases and schema
// ---------------------------------------------------------------------------

/// Closed set of property kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Title,
    Text,
    Number,
    Select,
    MultiSelect,
    Date,
    Checkbox,
    Relation,
    Url,
    Email,
    Phone,
    Media,
    Formula,
    Rollup,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Text => "text",
            Self::Number => "number",
            Self::Select => "select",
            Self::MultiSelect => "multi_select",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Relation => "relation",
            Self::Url => "url",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Media => "media",
            Self::Formula => "formula",
            Self::Rollup => "rollup",
        }
    }

    /// Values of these properties are derived rather than user supplied.
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Formula | Self::Rollup)
    }
}

impl FromStr for PropertyType {
    type Err = NotebaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(Self::Title),
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "select" => Ok(Self::Select),
            "multi_select" => Ok(Self::MultiSelect),
            "date" => Ok(Self::Date),
            "checkbox" => Ok(Self::Checkbox),
            "relation" => Ok(Self::Relation),
            "url" => Ok(Self::Url),
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "media" => Ok(Self::Media),
            "formula" => Ok(Self::Formula),
            "rollup" => Ok(Self::Rollup),
            other => Err(NotebaseError::invalid_argument(format!(
                "unknown property type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed field definition of a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub database_id: String,
    pub name: String,
    /// Stable key, unique within the database.
    pub slug: String,
    pub property_type: PropertyType,
    pub config: JsonObject,
    pub is_required: bool,
    /// Default payload, `null` when none.
    #[serde(rename = "default")]
    pub default_value: Value,
    pub order_index: i64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Fields for defining a property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub slug: String,
    pub property_type: PropertyType,
    #[serde(default)]
    pub config: JsonObject,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, rename = "default")]
    pub default_value: Value,
    #[serde(default)]
    pub order_index: i64,
}

impl NewProperty {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            property_type,
            config: JsonObject::new(),
            is_required: false,
            default_value: Value::Null,
            order_index: 0,
        }
    }

    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = order_index;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = default_value;
        self
    }
}

/// A user-defined structured collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: String,
    /// Unique across databases.
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub cover_image_id: Option<String>,
    pub is_archived: bool,
    pub created_at: u64,
    pub updated_at: u64,
    /// Ordered by `order_index`, then creation.
    pub properties: Vec<Property>,
    /// Creation order.
    pub views: Vec<View>,
}

impl Database {
    /// Look up a property by id or slug.
    pub fn property(&self, reference: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.id == reference || p.slug == reference)
    }

    pub fn view(&self, view_id: &str) -> Option<&View> {
        self.views.iter().find(|v| v.id == view_id)
    }
}

/// Fields for creating a database with its initial schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDatabase {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub cover_image_id: Option<String>,
    #[serde(default)]
    pub properties: Vec<NewProperty>,
    #[serde(default)]
    pub views: Vec<NewView>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Closed set of view layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    #[default]
    Table,
    List,
    Gallery,
    #[serde(alias = "kanban")]
    Board,
    Calendar,
    Timeline,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::List => "list",
            Self::Gallery => "gallery",
            Self::Board => "board",
            Self::Calendar => "calendar",
            Self::Timeline => "timeline",
        }
    }
}

impl FromStr for ViewType {
    type Err = NotebaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "list" => Ok(Self::List),
            "gallery" => Ok(Self::Gallery),
            "board" | "kanban" => Ok(Self::Board),
            "calendar" => Ok(Self::Calendar),
            "timeline" => Ok(Self::Timeline),
            other => Err(NotebaseError::invalid_argument(format!(
                "unknown view type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One entry of a view's sort specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSort {
    /// Property id or slug.
    pub property_id: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// A saved presentation over a database's items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: String,
    pub database_id: String,
    pub name: String,
    pub view_type: ViewType,
    /// Stored verbatim, never evaluated.
    pub filters: JsonObject,
    pub sorts: Vec<ViewSort>,
    pub grouping: JsonObject,
    pub display_properties: Vec<String>,
    pub layout_options: JsonObject,
    pub created_at: u64,
    pub updated_at: u64,
}

impl View {
    /// Property reference used for board grouping.
    pub fn grouping_property(&self) -> Option<&str> {
        string_option(&self.grouping, "property")
    }

    /// Property reference used for gallery covers.
    pub fn cover_property(&self) -> Option<&str> {
        string_option(&self.layout_options, "cover_property")
    }
}

/// Configuration for creating or fully replacing a view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewView {
    pub name: String,
    #[serde(default)]
    pub view_type: ViewType,
    #[serde(default)]
    pub filters: JsonObject,
    #[serde(default)]
    pub sorts: Vec<ViewSort>,
    #[serde(default)]
    pub grouping: JsonObject,
    #[serde(default)]
    pub display_properties: Vec<String>,
    #[serde(default)]
    pub layout_options: JsonObject,
}

impl NewView {
    pub fn new(name: impl Into<String>, view_type: ViewType) -> Self {
        Self {
            name: name.into(),
            view_type,
            ..Default::default()
        }
    }

    /// Every property reference this configuration makes, excluding filters.
    pub fn property_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.sorts.iter().map(|s| s.property_id.as_str()).collect();
        refs.extend(string_option(&self.grouping, "property"));
        refs.extend(self.display_properties.iter().map(String::as_str));
        refs.extend(string_option(&self.layout_options, "cover_property"));
        refs
    }
}

fn string_option<'a>(object: &'a JsonObject, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Items and values
// ---------------------------------------------------------------------------

/// Stored content of one property for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    /// Empty for transient values.
    pub id: String,
    pub item_id: String,
    pub property_id: String,
    pub value: Value,
    pub is_computed: bool,
    /// Synthesized for display only; never persisted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub transient: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PropertyValue {
    /// A display-only value that has no storage identity.
    pub fn transient(item_id: &str, property_id: &str, value: Value) -> Self {
        Self {
            id: String::new(),
            item_id: item_id.to_string(),
            property_id: property_id.to_string(),
            value,
            is_computed: false,
            transient: true,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// A page-backed row of a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub database_id: String,
    pub page: Page,
    /// Manual ordering key, not unique.
    pub position: i64,
    pub is_archived: bool,
    pub created_at: u64,
    pub updated_at: u64,
    /// Sparse map from property slug to value.
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Fields for creating an item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub page: NewPage,
    #[serde(default)]
    pub position: i64,
    /// Keyed by property slug or id.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl NewItem {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            page: NewPage::titled(title),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn at(mut self, position: i64) -> Self {
        self.position = position;
        self
    }
}

/// Partial item update. `values`, when present, replaces the whole map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub values: Option<BTreeMap<String, Value>>,
}

/// A database's schema and every one of its items, read together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub database: Database,
    /// Archived items included, in position order.
    pub items: Vec<Item>,
}

/// Read-only snapshot produced by resolving a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedView {
    pub database: Database,
    pub view: View,
    pub items: Vec<Item>,
}

/// Helper module for tri-state optional fields.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
