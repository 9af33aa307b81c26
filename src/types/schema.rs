//! Variable headers of a recording, keyed by channel name

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::VariableType;
use crate::GarageError;

/// The variables recorded in one IBT file and the size of each sample row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSchema {
    pub variables: HashMap<String, VariableInfo>,
    /// Bytes per sample row (`bufLen` in the header)
    pub frame_size: usize,
}

impl VariableSchema {
    /// Build a schema, rejecting headers that could not be decoded from a row.
    pub fn new(variables: HashMap<String, VariableInfo>, frame_size: usize) -> crate::Result<Self> {
        let schema = Self { variables, frame_size };
        schema.validate()?;
        Ok(schema)
    }

    /// A recording with session info but no variable headers.
    pub fn empty() -> Self {
        Self { variables: HashMap::new(), frame_size: 0 }
    }

    /// Every variable must be keyed by its own name, have at least one element
    /// and sit entirely inside a row.
    pub fn validate(&self) -> crate::Result<()> {
        let problem = self.variables.iter().find_map(|(key, info)| {
            if info.count == 0 {
                Some(format!("Variable '{key}' has count of 0"))
            } else if info.name != *key {
                Some(format!("Variable '{key}' is registered under header name '{}'", info.name))
            } else if info.end_offset() > self.frame_size {
                Some(format!(
                    "Variable '{key}' spans bytes {}..{} of a {} byte row",
                    info.offset,
                    info.end_offset(),
                    self.frame_size
                ))
            } else {
                None
            }
        });

        match problem {
            Some(details) => Err(GarageError::parse("Variable headers", details)),
            None => Ok(()),
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }
}

/// One decoded variable header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: VariableType,
    /// Byte offset of the first element within a row
    pub offset: usize,
    /// Element count; car-indexed arrays have one entry per car
    pub count: usize,
    pub count_as_time: bool,
    pub units: String,
    pub description: String,
}

impl VariableInfo {
    /// Whether this variable holds one value per sample.
    pub fn is_scalar(&self) -> bool {
        self.count == 1
    }

    /// First byte past the variable within a row.
    pub fn end_offset(&self) -> usize {
        self.offset + self.data_type.size() * self.count
    }
}
