// 👤 Entities - one row of the analysed table
// Constructed once per run, never mutated during analysis

use crate::error::LinkError;
use crate::fields::{normalize_value, FieldKey, FieldMapping, MAX_FIELDS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

// ============================================================================
// ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier (field key 1), trimmed but otherwise as entered
    pub id: String,

    /// 1-based data row this entity came from
    pub row: usize,

    /// Raw values of the comparable fields; empty cells are not stored
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<FieldKey, String>,
}

impl Entity {
    pub fn new(id: impl Into<String>, row: usize) -> Self {
        Entity {
            id: id.into().trim().to_string(),
            row,
            values: BTreeMap::new(),
        }
    }

    /// Builder: set a comparable value (the identifier key is ignored)
    pub fn with_value(mut self, key: FieldKey, value: impl Into<String>) -> Self {
        if !key.is_identifier() {
            let value = value.into();
            if !value.trim().is_empty() {
                self.values.insert(key, value);
            }
        }
        self
    }

    /// Raw value of a field; key 1 answers with the identifier
    pub fn value(&self, key: FieldKey) -> Option<&str> {
        if key.is_identifier() {
            Some(self.id.as_str())
        } else {
            self.values.get(&key).map(String::as_str)
        }
    }

    /// Comparison form of a comparable field
    pub fn normalized(&self, key: FieldKey) -> Option<String> {
        if key.is_identifier() {
            return None;
        }
        self.values.get(&key).and_then(|v| normalize_value(v))
    }
}

// ============================================================================
// ENTITY TABLE
// ============================================================================

/// Rows of one dataset snapshot, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTable {
    entities: Vec<Entity>,
}

impl EntityTable {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Load a CSV file whose header names the mapped fields
    pub fn from_csv_path(path: &Path, mapping: &FieldMapping) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
        Self::from_csv_reader(file, mapping)
            .with_context(|| format!("Failed to load entities from {}", path.display()))
    }

    /// Header columns are matched by column name or display name; unmapped columns are ignored.
    pub fn from_csv_reader<R: Read>(reader: R, mapping: &FieldMapping) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = rdr.headers().context("Failed to read CSV header")?.clone();

        // column index → field key
        let mut columns: Vec<(usize, FieldKey)> = Vec::new();
        for def in mapping.fields() {
            if let Some(idx) = headers.iter().position(|h| def.matches(h)) {
                columns.push((idx, def.key));
            }
        }

        let identifier = mapping
            .identifier()
            .ok_or_else(|| LinkError::mapping("identifier field (key 1) is not configured"))?;
        if !columns.iter().any(|(_, key)| key.is_identifier()) {
            return Err(LinkError::UnknownField(format!(
                "identifier column '{}' not found in CSV header",
                identifier.display_name
            ))
            .into());
        }

        let mut entities = Vec::new();
        for (index, record) in rdr.records().enumerate() {
            let row = index + 1;
            let record = record.with_context(|| format!("Failed to read CSV row {}", row))?;

            let mut cells: [&str; MAX_FIELDS] = [""; MAX_FIELDS];
            for (idx, key) in &columns {
                cells[key.get() as usize - 1] = record.get(*idx).unwrap_or("");
            }

            if let Some(entity) = entity_from_cells(&cells, row)? {
                entities.push(entity);
            }
        }

        tracing::debug!(rows = entities.len(), "loaded entity table from CSV");
        Ok(EntityTable { entities })
    }

    /// Column-oriented input: one value list per slot (index 0 = identifier).
    ///
    /// Shorter lists are padded with empty values and fully empty rows are dropped.
    pub fn from_columns<S: AsRef<str>>(
        mapping: &FieldMapping,
        columns: &[Vec<S>],
    ) -> std::result::Result<Self, LinkError> {
        if columns.len() > MAX_FIELDS {
            return Err(LinkError::mapping(format!(
                "{} columns given, at most {} are supported",
                columns.len(),
                MAX_FIELDS
            )));
        }

        let height = columns.iter().map(Vec::len).max().unwrap_or(0);
        let mut entities = Vec::new();

        for index in 0..height {
            let mut cells: [&str; MAX_FIELDS] = [""; MAX_FIELDS];
            for (slot, column) in columns.iter().enumerate() {
                let configured = FieldKey::new(slot as u8 + 1)
                    .ok()
                    .and_then(|key| mapping.get(key))
                    .is_some();
                if configured {
                    cells[slot] = column.get(index).map(AsRef::<str>::as_ref).unwrap_or("");
                }
            }

            if let Some(entity) = entity_from_cells(&cells, index + 1)? {
                entities.push(entity);
            }
        }

        Ok(EntityTable { entities })
    }
}

fn entity_from_cells(
    cells: &[&str; MAX_FIELDS],
    row: usize,
) -> std::result::Result<Option<Entity>, LinkError> {
    if cells.iter().all(|c| c.trim().is_empty()) {
        return Ok(None);
    }

    let id = cells[0].trim();
    if id.is_empty() {
        return Err(LinkError::MissingIdentifier { row });
    }

    let mut entity = Entity::new(id, row);
    for (slot, cell) in cells.iter().enumerate().skip(1) {
        entity = entity.with_value(FieldKey::new(slot as u8 + 1)?, *cell);
    }
    Ok(Some(entity))
}

/// Text box input: one value per line, blank lines skipped
pub fn parse_column_input(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: u8) -> FieldKey {
        FieldKey::new(k).unwrap()
    }

    fn mapping() -> FieldMapping {
        FieldMapping::from_display_names(&["Client ID", "Phone Number", "Email"]).unwrap()
    }

    #[test]
    fn test_entity_ignores_blank_values() {
        let e = Entity::new(" C1 ", 1)
            .with_value(key(2), "   ")
            .with_value(key(3), "A@B.com");

        assert_eq!(e.id, "C1");
        assert_eq!(e.value(key(2)), None);
        assert_eq!(e.value(FieldKey::IDENTIFIER), Some("C1"));
        assert_eq!(e.normalized(key(3)), Some("a@b.com".to_string()));
        assert_eq!(e.normalized(FieldKey::IDENTIFIER), None);
    }

    #[test]
    fn test_parse_column_input() {
        let values = parse_column_input("  a \n\n b\r\n   \nc");
        assert_eq!(values, vec!["a", "b", "c"]);
        assert!(parse_column_input("").is_empty());
    }

    #[test]
    fn test_csv_header_matching() {
        let data = "email,Client ID,notes,phone_number\n\
                    x@y.com,C1,hello,555\n\
                    ,C2,,555\n";
        let table = EntityTable::from_csv_reader(data.as_bytes(), &mapping()).unwrap();

        assert_eq!(table.len(), 2);
        let c1 = &table.entities()[0];
        assert_eq!(c1.id, "C1");
        assert_eq!(c1.row, 1);
        assert_eq!(c1.value(key(2)), Some("555"));
        assert_eq!(c1.value(key(3)), Some("x@y.com"));
        assert_eq!(table.entities()[1].value(key(3)), None);
    }

    #[test]
    fn test_csv_missing_identifier_column() {
        let data = "phone_number,email\n555,x@y.com\n";
        let err = EntityTable::from_csv_reader(data.as_bytes(), &mapping()).unwrap_err();
        assert!(format!("{:#}", err).contains("Client ID"));
    }

    #[test]
    fn test_csv_row_without_identifier_is_an_error() {
        let data = "client_id,phone_number\nC1,555\n,556\n";
        let err = EntityTable::from_csv_reader(data.as_bytes(), &mapping()).unwrap_err();
        let link = err.downcast_ref::<LinkError>().unwrap();
        assert_eq!(link, &LinkError::MissingIdentifier { row: 2 });
    }

    #[test]
    fn test_csv_skips_fully_empty_rows() {
        let data = "client_id,phone_number\nC1,555\n,\nC2,556\n";
        let table = EntityTable::from_csv_reader(data.as_bytes(), &mapping()).unwrap();
        let rows: Vec<usize> = table.entities().iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![1, 3]);
    }

    #[test]
    fn test_csv_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.csv");
        std::fs::write(&path, "Client ID,Email\nC1,a@b.com\n").unwrap();

        let table = EntityTable::from_csv_path(&path, &mapping()).unwrap();
        assert_eq!(table.len(), 1);

        let missing = EntityTable::from_csv_path(&dir.path().join("nope.csv"), &mapping());
        assert!(missing.is_err());
    }

    #[test]
    fn test_from_columns_pads_short_lists() {
        let columns = vec![
            vec!["C1", "C2", "C3"],
            vec!["555", "555"],
            vec![],
        ];
        let table = EntityTable::from_columns(&mapping(), &columns).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.entities()[2].value(key(2)), None);
    }

    #[test]
    fn test_from_columns_row_without_identifier() {
        let columns = vec![vec!["C1"], vec!["555", "556"]];
        let err = EntityTable::from_columns(&mapping(), &columns).unwrap_err();
        assert_eq!(err, LinkError::MissingIdentifier { row: 2 });
    }

    #[test]
    fn test_from_columns_ignores_unconfigured_slots() {
        let mapping = FieldMapping::from_display_names(&["Client ID", "", "Email"]).unwrap();
        let columns = vec![vec!["C1"], vec!["555"], vec!["a@b.com"]];
        let table = EntityTable::from_columns(&mapping, &columns).unwrap();

        let e = &table.entities()[0];
        assert_eq!(e.value(key(2)), None);
        assert_eq!(e.value(key(3)), Some("a@b.com"));
    }
}
