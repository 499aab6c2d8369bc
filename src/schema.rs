//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of provider configuration, resources, data
//! sources, list resources and state stores. The dispatcher uses them to type
//! every value it decodes, and to decide which attributes become unknown
//! during planning.
//!
//! Schemas can be built fluently or loaded from JSON:
//!
//! ```
//! use hemmer_provider_testkit::schema::{Attribute, Schema};
//!
//! let built = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("id", Attribute::computed_string());
//!
//! let loaded: Schema = serde_json::from_str(r#"{
//!     "attributes": {
//!         "name": {"type": "string", "mode": "required"},
//!         "id": {"type": "string", "mode": "computed"}
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(built, loaded);
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::generated;
use crate::path::{AttributePath, PathStep};
use crate::types::Type;

/// How an attribute may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeMode {
    /// Must be set in configuration.
    Required,
    /// May be set in configuration.
    #[default]
    Optional,
    /// Set by the provider only.
    Computed,
    /// May be set in configuration, otherwise set by the provider.
    OptionalComputed,
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: Type,
    /// How the attribute can be used.
    #[serde(default)]
    pub mode: AttributeMode,
    /// The attribute is sensitive and should be hidden in logs/UI.
    #[serde(default)]
    pub sensitive: bool,
    /// The attribute is deprecated.
    #[serde(default)]
    pub deprecated: bool,
    /// Human-readable description of the attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    /// Create a new attribute with the given type and mode.
    pub fn new(attr_type: Type, mode: AttributeMode) -> Self {
        Self {
            attr_type,
            mode,
            sensitive: false,
            deprecated: false,
            description: None,
        }
    }

    /// Create a required attribute.
    pub fn required(attr_type: Type) -> Self {
        Self::new(attr_type, AttributeMode::Required)
    }

    /// Create an optional attribute.
    pub fn optional(attr_type: Type) -> Self {
        Self::new(attr_type, AttributeMode::Optional)
    }

    /// Create a computed attribute.
    pub fn computed(attr_type: Type) -> Self {
        Self::new(attr_type, AttributeMode::Computed)
    }

    /// Create an optional+computed attribute.
    pub fn optional_computed(attr_type: Type) -> Self {
        Self::new(attr_type, AttributeMode::OptionalComputed)
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::required(Type::String)
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::optional(Type::String)
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::computed(Type::String)
    }

    /// Create a required number attribute.
    pub fn required_number() -> Self {
        Self::required(Type::Number)
    }

    /// Create an optional number attribute.
    pub fn optional_number() -> Self {
        Self::optional(Type::Number)
    }

    /// Create a computed number attribute.
    pub fn computed_number() -> Self {
        Self::computed(Type::Number)
    }

    /// Create a required bool attribute.
    pub fn required_bool() -> Self {
        Self::required(Type::Bool)
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::optional(Type::Bool)
    }

    /// Create a computed bool attribute.
    pub fn computed_bool() -> Self {
        Self::computed(Type::Bool)
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Mark this attribute as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// True for Required.
    pub fn is_required(&self) -> bool {
        self.mode == AttributeMode::Required
    }

    /// True for Optional and OptionalComputed.
    pub fn is_optional(&self) -> bool {
        matches!(
            self.mode,
            AttributeMode::Optional | AttributeMode::OptionalComputed
        )
    }

    /// True for Computed and OptionalComputed.
    pub fn is_computed(&self) -> bool {
        matches!(
            self.mode,
            AttributeMode::Computed | AttributeMode::OptionalComputed
        )
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    /// A single nested block (at most one).
    #[default]
    Single,
    /// Like single, but never null: absent means all attributes null.
    Group,
    /// A list of nested blocks (zero or more, ordered).
    List,
    /// A set of nested blocks (zero or more, unordered, unique).
    Set,
    /// A map of nested blocks keyed by string.
    Map,
}

/// A block of attributes and nested blocks.
///
/// Attributes and nested blocks keep their insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub blocks: IndexMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The block is deprecated.
    #[serde(default)]
    pub deprecated: bool,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The object type of a value conforming to this block.
    pub fn value_type(&self) -> Type {
        let attrs = self
            .attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.attr_type.clone()));
        let blocks = self
            .blocks
            .iter()
            .map(|(name, nested)| (name.clone(), nested.value_type()));
        Type::object(attrs.chain(blocks))
    }
}

/// A nested block with its nesting mode and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block is nested.
    #[serde(default)]
    pub nesting_mode: NestingMode,
    /// Minimum number of blocks required.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: NestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
        }
    }

    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Single, 1)
    }

    /// Create a group block.
    pub fn group(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Group, 1)
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, NestingMode::List, 0)
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Set, 0)
    }

    /// Create a map of nested blocks.
    pub fn map(block: Block) -> Self {
        Self::with_mode(block, NestingMode::Map, 0)
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// The type of a value conforming to this nested block.
    pub fn value_type(&self) -> Type {
        let object = self.block.value_type();
        match self.nesting_mode {
            NestingMode::Single | NestingMode::Group => object,
            NestingMode::List => Type::list(object),
            NestingMode::Set => Type::set(object),
            NestingMode::Map => Type::map(object),
        }
    }
}

/// Schema for a provider, resource, data source, list resource or state
/// store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    #[serde(default)]
    pub version: i64,
    /// The root block containing all attributes and nested blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: i64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// The object type of a value conforming to this schema.
    pub fn value_type(&self) -> Type {
        self.block.value_type()
    }

    /// Find the attribute addressed by `path`.
    ///
    /// Name steps match attributes before nested blocks. An attribute only
    /// matches on the final step: attribute types are not descended into. A
    /// path ending on a nested block yields `None`. Under list, set and map
    /// blocks, the element key step that follows the block name is consumed
    /// before descending.
    pub fn attribute_at_path(&self, path: &AttributePath) -> Option<&Attribute> {
        let steps = path.steps();
        let mut block = &self.block;
        let mut i = 0;

        while i < steps.len() {
            let PathStep::AttributeName(name) = &steps[i] else {
                return None;
            };
            i += 1;

            if let Some(attr) = block.attributes.get(name) {
                return (i == steps.len()).then_some(attr);
            }

            let nested = block.blocks.get(name)?;
            let key_fits = match (nested.nesting_mode, steps.get(i)) {
                (NestingMode::Single | NestingMode::Group, _) => None,
                (NestingMode::List, Some(PathStep::ElementKeyInt(_)))
                | (NestingMode::Set, Some(PathStep::ElementKeyValue(_)))
                | (NestingMode::Map, Some(PathStep::ElementKeyString(_))) => Some(true),
                _ => Some(false),
            };
            match key_fits {
                Some(false) => return None,
                Some(true) => i += 1,
                None => {}
            }
            block = &nested.block;
        }

        None
    }
}

/// Whether an identity attribute must be supplied on import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportRequirement {
    /// Must be supplied when importing by identity.
    #[default]
    RequiredForImport,
    /// May be supplied when importing by identity.
    OptionalForImport,
}

/// One attribute of an [`IdentitySchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityAttribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: Type,
    /// Import requirement.
    #[serde(default)]
    pub import: ImportRequirement,
    /// Human-readable description of the attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IdentityAttribute {
    /// An attribute required for import.
    pub fn required_for_import(attr_type: Type) -> Self {
        Self {
            attr_type,
            import: ImportRequirement::RequiredForImport,
            description: None,
        }
    }

    /// An attribute optional for import.
    pub fn optional_for_import(attr_type: Type) -> Self {
        Self {
            attr_type,
            import: ImportRequirement::OptionalForImport,
            description: None,
        }
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Flat schema of a resource's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IdentitySchema {
    /// The version of this identity schema.
    #[serde(default)]
    pub version: i64,
    /// Identity attributes in declaration order.
    #[serde(default)]
    pub attributes: IndexMap<String, IdentityAttribute>,
}

impl IdentitySchema {
    /// Create an identity schema at version 0.
    pub fn v0() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: IdentityAttribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// The object type of an identity value.
    pub fn value_type(&self) -> Type {
        Type::object(
            self.attributes
                .iter()
                .map(|(name, attr)| (name.clone(), attr.attr_type.clone())),
        )
    }
}

// ============================================================================
// Wire conversion
// ============================================================================

impl From<&Schema> for generated::Schema {
    fn from(schema: &Schema) -> Self {
        generated::Schema {
            version: schema.version,
            block: Some(block_to_proto(&schema.block, schema.version)),
        }
    }
}

fn block_to_proto(block: &Block, version: i64) -> generated::schema::Block {
    use generated::schema::nested_block::NestingMode as WireNesting;

    generated::schema::Block {
        version,
        attributes: block
            .attributes
            .iter()
            .map(|(name, attr)| generated::schema::Attribute {
                name: name.clone(),
                r#type: attr.attr_type.to_json_bytes(),
                description: attr.description.clone().unwrap_or_default(),
                required: attr.is_required(),
                optional: attr.is_optional(),
                computed: attr.is_computed(),
                sensitive: attr.sensitive,
                deprecated: attr.deprecated,
            })
            .collect(),
        block_types: block
            .blocks
            .iter()
            .map(|(name, nested)| generated::schema::NestedBlock {
                type_name: name.clone(),
                block: Some(block_to_proto(&nested.block, version)),
                nesting: match nested.nesting_mode {
                    NestingMode::Single => WireNesting::Single as i32,
                    NestingMode::Group => WireNesting::Group as i32,
                    NestingMode::List => WireNesting::List as i32,
                    NestingMode::Set => WireNesting::Set as i32,
                    NestingMode::Map => WireNesting::Map as i32,
                },
                min_items: i64::from(nested.min_items),
                max_items: i64::from(nested.max_items),
            })
            .collect(),
        description: block.description.clone().unwrap_or_default(),
        deprecated: block.deprecated,
    }
}

impl TryFrom<generated::Schema> for Schema {
    type Error = ProviderError;

    fn try_from(schema: generated::Schema) -> Result<Self, Self::Error> {
        Ok(Schema {
            version: schema.version,
            block: match schema.block {
                Some(block) => block_from_proto(block)?,
                None => Block::new(),
            },
        })
    }
}

fn block_from_proto(block: generated::schema::Block) -> Result<Block, ProviderError> {
    use generated::schema::nested_block::NestingMode as WireNesting;

    let mut out = Block::new();
    out.description = (!block.description.is_empty()).then_some(block.description);
    out.deprecated = block.deprecated;

    for attr in block.attributes {
        let mode = match (attr.required, attr.optional, attr.computed) {
            (true, false, false) => AttributeMode::Required,
            (false, true, false) => AttributeMode::Optional,
            (false, false, true) => AttributeMode::Computed,
            (false, true, true) => AttributeMode::OptionalComputed,
            _ => {
                return Err(ProviderError::InvalidType(format!(
                    "attribute {:?} has an invalid combination of required/optional/computed",
                    attr.name
                )))
            }
        };
        out.attributes.insert(
            attr.name,
            Attribute {
                attr_type: Type::from_json_bytes(&attr.r#type)?,
                mode,
                sensitive: attr.sensitive,
                deprecated: attr.deprecated,
                description: (!attr.description.is_empty()).then_some(attr.description),
            },
        );
    }

    for nested in block.block_types {
        let nesting_mode = match WireNesting::try_from(nested.nesting) {
            Ok(WireNesting::Single) => NestingMode::Single,
            Ok(WireNesting::Group) => NestingMode::Group,
            Ok(WireNesting::List) => NestingMode::List,
            Ok(WireNesting::Set) => NestingMode::Set,
            Ok(WireNesting::Map) => NestingMode::Map,
            Ok(WireNesting::Invalid) | Err(_) => {
                return Err(ProviderError::InvalidType(format!(
                    "nested block {:?} has invalid nesting mode {}",
                    nested.type_name, nested.nesting
                )))
            }
        };
        let items = |n: i64| {
            u32::try_from(n).map_err(|_| {
                ProviderError::InvalidType(format!(
                    "nested block {:?} has invalid item count {}",
                    nested.type_name, n
                ))
            })
        };
        let min_items = items(nested.min_items)?;
        let max_items = items(nested.max_items)?;
        let block = match nested.block {
            Some(block) => block_from_proto(block)?,
            None => Block::new(),
        };
        out.blocks.insert(
            nested.type_name,
            NestedBlock {
                block,
                nesting_mode,
                min_items,
                max_items,
            },
        );
    }

    Ok(out)
}

impl From<&IdentitySchema> for generated::ResourceIdentitySchema {
    fn from(schema: &IdentitySchema) -> Self {
        generated::ResourceIdentitySchema {
            version: schema.version,
            identity_attributes: schema
                .attributes
                .iter()
                .map(
                    |(name, attr)| generated::resource_identity_schema::IdentityAttribute {
                        name: name.clone(),
                        r#type: attr.attr_type.to_json_bytes(),
                        required_for_import: attr.import == ImportRequirement::RequiredForImport,
                        optional_for_import: attr.import == ImportRequirement::OptionalForImport,
                        description: attr.description.clone().unwrap_or_default(),
                    },
                )
                .collect(),
        }
    }
}

impl TryFrom<generated::ResourceIdentitySchema> for IdentitySchema {
    type Error = ProviderError;

    fn try_from(schema: generated::ResourceIdentitySchema) -> Result<Self, Self::Error> {
        let mut out = IdentitySchema {
            version: schema.version,
            attributes: IndexMap::new(),
        };
        for attr in schema.identity_attributes {
            let import = if attr.optional_for_import {
                ImportRequirement::OptionalForImport
            } else {
                ImportRequirement::RequiredForImport
            };
            out.attributes.insert(
                attr.name,
                IdentityAttribute {
                    attr_type: Type::from_json_bytes(&attr.r#type)?,
                    import,
                    description: (!attr.description.is_empty()).then_some(attr.description),
                },
            );
        }
        Ok(out)
    }
}
