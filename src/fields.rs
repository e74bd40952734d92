// 🏷️ Field Mapping - which columns identify an entity and which are compared
// Slot 1 is always the identifier, slots 2..=9 are comparable attributes

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of configurable field slots (identifier included)
pub const MAX_FIELDS: usize = 9;

/// Normalized values that mean "no value" in exported spreadsheets
const PLACEHOLDER_VALUES: [&str; 3] = ["nan", "none", "null"];

// ============================================================================
// FIELD KEY
// ============================================================================

/// Position of a field in the mapping (1-based, 1 = identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FieldKey(u8);

impl FieldKey {
    pub const IDENTIFIER: FieldKey = FieldKey(1);

    pub fn new(key: u8) -> Result<Self> {
        if key == 0 || key as usize > MAX_FIELDS {
            return Err(LinkError::UnknownField(format!(
                "field key {} is outside 1..={}",
                key, MAX_FIELDS
            )));
        }
        Ok(FieldKey(key))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_identifier(self) -> bool {
        self == Self::IDENTIFIER
    }

    fn slot(self) -> usize {
        self.0 as usize - 1
    }

    fn from_slot(slot: usize) -> Self {
        FieldKey(slot as u8 + 1)
    }
}

impl TryFrom<u8> for FieldKey {
    type Error = LinkError;

    fn try_from(key: u8) -> Result<Self> {
        FieldKey::new(key)
    }
}

impl From<FieldKey> for u8 {
    fn from(key: FieldKey) -> u8 {
        key.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}", self.0)
    }
}

// ============================================================================
// FIELD DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: FieldKey,

    /// Column name used for matching headers (e.g. "phone_number")
    pub name: String,

    /// Name shown to the analyst (e.g. "Phone Number")
    pub display_name: String,
}

impl FieldDefinition {
    fn new(key: FieldKey, display_name: &str) -> Self {
        FieldDefinition {
            key,
            name: normalize_field_name(display_name),
            display_name: display_name.trim().to_string(),
        }
    }

    /// True when `label` refers to this field by column or display name
    pub fn matches(&self, label: &str) -> bool {
        let label = label.trim();
        normalize_field_name(label) == self.name || label.eq_ignore_ascii_case(&self.display_name)
    }
}

/// "Phone Number" → "phone_number"
pub fn normalize_field_name(display_name: &str) -> String {
    display_name.trim().to_lowercase().replace(' ', "_")
}

/// Comparison form of a cell: trimmed and case-folded, `None` when empty.
pub fn normalize_value(raw: &str) -> Option<String> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() || PLACEHOLDER_VALUES.contains(&value.as_str()) {
        None
    } else {
        Some(value)
    }
}

// ============================================================================
// FIELD MAPPING
// ============================================================================

/// Ordered, fixed-size set of (key, display name) pairs configured per run.
///
/// Empty slots are allowed anywhere after the identifier; comparison only
/// ever walks the configured keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FieldMapping {
    slots: [Option<FieldDefinition>; MAX_FIELDS],
}

impl FieldMapping {
    /// Mapping with only the identifier configured
    pub fn new(identifier_display_name: &str) -> Self {
        let mut mapping = FieldMapping {
            slots: Default::default(),
        };
        mapping.slots[0] = Some(FieldDefinition::new(FieldKey::IDENTIFIER, identifier_display_name));
        mapping
    }

    /// Builder: configure a slot (replaces whatever was there)
    pub fn with_field(mut self, key: u8, display_name: &str) -> Result<Self> {
        let key = FieldKey::new(key)?;
        self.slots[key.slot()] = if display_name.trim().is_empty() {
            None
        } else {
            Some(FieldDefinition::new(key, display_name))
        };
        Ok(self)
    }

    /// Slot i+1 takes name i; blank names leave the slot empty.
    pub fn from_display_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.len() > MAX_FIELDS {
            return Err(LinkError::mapping(format!(
                "{} fields given, at most {} are supported",
                names.len(),
                MAX_FIELDS
            )));
        }

        let mut mapping = FieldMapping {
            slots: Default::default(),
        };
        for (slot, name) in names.iter().enumerate() {
            let name = name.as_ref();
            if !name.trim().is_empty() {
                mapping.slots[slot] = Some(FieldDefinition::new(FieldKey::from_slot(slot), name));
            }
        }
        Ok(mapping)
    }

    /// The nine default fields of a client fraud review
    pub fn default_fraud_fields() -> Self {
        let names = [
            "Client ID",
            "Device ID",
            "Password",
            "IP Address",
            "Phone Number",
            "Email",
            "Affiliate Source",
            "User Agent",
            "Session ID",
        ];
        let mut mapping = FieldMapping {
            slots: Default::default(),
        };
        for (slot, name) in names.iter().enumerate() {
            mapping.slots[slot] = Some(FieldDefinition::new(FieldKey::from_slot(slot), name));
        }
        mapping
    }

    pub fn identifier(&self) -> Option<&FieldDefinition> {
        self.slots[0].as_ref()
    }

    pub fn get(&self, key: FieldKey) -> Option<&FieldDefinition> {
        self.slots[key.slot()].as_ref()
    }

    /// Configured non-identifier fields in key order
    pub fn comparable_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.slots[1..].iter().flatten()
    }

    /// All configured fields in key order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.slots.iter().flatten()
    }

    /// Look a field up by column name or display name
    pub fn find(&self, label: &str) -> Option<&FieldDefinition> {
        self.fields().find(|def| def.matches(label))
    }

    /// Display name for a key, falling back to "field N" for empty slots
    pub fn display_name(&self, key: FieldKey) -> String {
        self.get(key)
            .map(|def| def.display_name.clone())
            .unwrap_or_else(|| key.to_string())
    }

    /// Copy of this mapping with the given comparable keys cleared
    pub fn without(&self, keys: &[FieldKey]) -> Self {
        let mut next = self.clone();
        for key in keys.iter().filter(|k| !k.is_identifier()) {
            next.slots[key.slot()] = None;
        }
        next
    }

    /// Identifier plus at least one comparable field, no two slots with the same column name.
    pub fn validate(&self) -> Result<()> {
        if self.identifier().is_none() {
            return Err(LinkError::mapping("identifier field (key 1) is not configured"));
        }

        if self.comparable_fields().next().is_none() {
            return Err(LinkError::mapping(
                "at least one field besides the identifier must be configured",
            ));
        }

        let defs: Vec<&FieldDefinition> = self.fields().collect();
        for (i, def) in defs.iter().enumerate() {
            if let Some(other) = defs[..i].iter().find(|d| d.name == def.name) {
                return Err(LinkError::mapping(format!(
                    "'{}' is configured for both {} and {}",
                    def.display_name, other.key, def.key
                )));
            }
        }

        Ok(())
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::default_fraud_fields()
    }
}

impl TryFrom<Vec<String>> for FieldMapping {
    type Error = LinkError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        FieldMapping::from_display_names(&names)
    }
}

impl From<FieldMapping> for Vec<String> {
    fn from(mapping: FieldMapping) -> Self {
        let last = mapping
            .slots
            .iter()
            .rposition(Option::is_some)
            .map(|i| i + 1)
            .unwrap_or(0);

        mapping.slots[..last]
            .iter()
            .map(|slot| slot.as_ref().map(|d| d.display_name.clone()).unwrap_or_default())
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
