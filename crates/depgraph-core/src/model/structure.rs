//! Build-unit containment overlay.
//!
//! A multi-module build is a tree of build units: one root and any number of
//! nested children. The overlay reuses [`Coordinate`] identity but lives in
//! its own namespace; sinks persist it apart from modules and dependencies.

use serde::Deserialize;
use std::collections::HashSet;

use super::coordinate::Coordinate;
use super::graph::DEFAULT_PACKAGING;
use crate::error::ExportError;

/// One build unit of the project structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    pub coordinate: Coordinate,
    pub packaging: String,
    pub is_root: bool,
}

/// Parent → child containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Containment {
    pub parent: Coordinate,
    pub child: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStructure {
    units: Vec<BuildUnit>,
    links: Vec<Containment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUnit {
    group_id: String,
    artifact_id: String,
    version: String,
    #[serde(default, rename = "type", alias = "packaging")]
    packaging: Option<String>,
    #[serde(default)]
    modules: Vec<RawUnit>,
}

#[derive(Debug, Deserialize)]
struct RawStructure {
    root: RawUnit,
    #[serde(default)]
    modules: Vec<RawUnit>,
}

impl ProjectStructure {
    /// A structure holding only the root unit.
    #[must_use]
    pub fn new(root: Coordinate, packaging: impl Into<String>) -> Self {
        Self {
            units: vec![BuildUnit {
                coordinate: root,
                packaging: packaging.into(),
                is_root: true,
            }],
            links: Vec::new(),
        }
    }

    /// Add `child` under `parent`. Unknown parents and repeated children are
    /// rejected so the overlay stays a tree.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidInput`] if the parent is unknown or the
    /// child already belongs to the structure.
    pub fn add_child(
        &mut self,
        parent: &Coordinate,
        child: Coordinate,
        packaging: impl Into<String>,
    ) -> Result<(), ExportError> {
        if !self.units.iter().any(|unit| &unit.coordinate == parent) {
            return Err(ExportError::InvalidInput(format!(
                "build unit parent {parent} is not part of the structure"
            )));
        }
        if self.units.iter().any(|unit| unit.coordinate == child) {
            return Err(ExportError::InvalidInput(format!(
                "build unit {child} appears twice in the structure"
            )));
        }
        self.links.push(Containment {
            parent: parent.clone(),
            child: child.clone(),
        });
        self.units.push(BuildUnit {
            coordinate: child,
            packaging: packaging.into(),
            is_root: false,
        });
        Ok(())
    }

    /// Parse the reactor description emitted next to the resolver tree.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidInput`] for malformed JSON or a unit
    /// that appears twice.
    pub fn from_json_str(json: &str) -> Result<Self, ExportError> {
        let raw: RawStructure = serde_json::from_str(json)
            .map_err(|err| ExportError::InvalidInput(format!("project structure: {err}")))?;

        let root = unit_coordinate(&raw.root);
        let mut structure = Self::new(root.clone(), packaging_of(&raw.root));
        let mut pending: Vec<(Coordinate, &RawUnit)> = raw
            .root
            .modules
            .iter()
            .chain(raw.modules.iter())
            .map(|unit| (root.clone(), unit))
            .collect();
        pending.reverse();

        while let Some((parent, unit)) = pending.pop() {
            let coordinate = unit_coordinate(unit);
            structure.add_child(&parent, coordinate.clone(), packaging_of(unit))?;
            for nested in unit.modules.iter().rev() {
                pending.push((coordinate.clone(), nested));
            }
        }

        Ok(structure)
    }

    #[must_use]
    pub fn root(&self) -> &BuildUnit {
        &self.units[0]
    }

    #[must_use]
    pub fn units(&self) -> &[BuildUnit] {
        &self.units
    }

    #[must_use]
    pub fn links(&self) -> &[Containment] {
        &self.links
    }

    /// Coordinates of every unit.
    #[must_use]
    pub fn coordinates(&self) -> HashSet<Coordinate> {
        self.units.iter().map(|unit| unit.coordinate.clone()).collect()
    }
}

fn unit_coordinate(unit: &RawUnit) -> Coordinate {
    Coordinate::new(&unit.group_id, &unit.artifact_id, &unit.version)
}

fn packaging_of(unit: &RawUnit) -> String {
    unit.packaging
        .clone()
        .unwrap_or_else(|| DEFAULT_PACKAGING.to_string())
}
