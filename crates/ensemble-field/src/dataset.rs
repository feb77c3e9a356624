//! A grid geometry together with the fields defined on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, FieldResult};
use crate::field::GriddedField;
use crate::geometry::{GridGeometry, Location};
use crate::variable::Variable;

/// Fields of several variables sharing one geometry, member count and set
/// of lead times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetRepr")]
pub struct Dataset {
    geometry: GridGeometry,
    n_ens: usize,
    n_time: usize,
    fields: BTreeMap<Variable, GriddedField>,
}

#[derive(Deserialize)]
struct DatasetRepr {
    geometry: GridGeometry,
    n_ens: usize,
    n_time: usize,
    #[serde(default)]
    fields: BTreeMap<Variable, GriddedField>,
}

impl TryFrom<DatasetRepr> for Dataset {
    type Error = FieldError;

    fn try_from(repr: DatasetRepr) -> FieldResult<Self> {
        let mut dataset = Dataset::new(repr.geometry, repr.n_ens, repr.n_time);
        for (variable, field) in repr.fields {
            dataset.set_field(variable, field)?;
        }
        Ok(dataset)
    }
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new(geometry: GridGeometry, n_ens: usize, n_time: usize) -> Self {
        Self {
            geometry,
            n_ens,
            n_time,
            fields: BTreeMap::new(),
        }
    }

    /// Parse a dataset from JSON, validating every field's shape.
    pub fn from_json(json: &str) -> FieldResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON with missing values written as `null`.
    pub fn to_json(&self) -> FieldResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn n_lat(&self) -> usize {
        self.geometry.n_lat()
    }

    pub fn n_lon(&self) -> usize {
        self.geometry.n_lon()
    }

    pub fn n_ens(&self) -> usize {
        self.n_ens
    }

    pub fn n_time(&self) -> usize {
        self.n_time
    }

    /// `(n_lat, n_lon, n_ens, n_time)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.n_lat(), self.n_lon(), self.n_ens, self.n_time)
    }

    pub fn location(&self, i: usize, j: usize) -> Location {
        self.geometry.location(i, j)
    }

    pub fn field(&self, variable: Variable) -> Option<&GriddedField> {
        self.fields.get(&variable)
    }

    pub fn field_mut(&mut self, variable: Variable) -> Option<&mut GriddedField> {
        self.fields.get_mut(&variable)
    }

    pub fn has_field(&self, variable: Variable) -> bool {
        self.fields.contains_key(&variable)
    }

    /// Variables currently stored, in a stable order.
    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.fields.keys().copied()
    }

    /// A field of this dataset's shape with every value missing.
    pub fn empty_field(&self) -> GriddedField {
        GriddedField::missing(self.n_lat(), self.n_lon(), self.n_ens, self.n_time)
    }

    /// Store `field` under `variable`, replacing any previous field.
    ///
    /// Returns the replaced field, or an error if the shape differs from the
    /// dataset's.
    pub fn set_field(
        &mut self,
        variable: Variable,
        field: GriddedField,
    ) -> FieldResult<Option<GriddedField>> {
        if field.shape() != self.shape() {
            return Err(FieldError::ShapeMismatch {
                expected: self.shape(),
                found: field.shape(),
            });
        }
        Ok(self.fields.insert(variable, field))
    }

    /// Remove and return the field for `variable`.
    pub fn take_field(&mut self, variable: Variable) -> Option<GriddedField> {
        self.fields.remove(&variable)
    }
}
