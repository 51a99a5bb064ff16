//! Arena representation of the upstream resolver's dependency tree.
//!
//! The resolver hands over a tree whose nodes carry scope, optionality and an
//! optional conflict marker. Nodes live in a flat `Vec` and reference their
//! children by [`NodeIdx`], so a cyclic input (a child index pointing back at
//! an ancestor) is representable without reference cycles.
//!
//! Two ways in:
//! - [`ResolvedTree::from_json_str`] / [`ResolvedTree::from_json_reader`] for
//!   the resolver's nested JSON dump
//! - [`TreeBuilder`] for programmatic construction

use serde::Deserialize;
use std::io::Read;

use crate::error::ExportError;
use crate::model::{Coordinate, DEFAULT_PACKAGING, Scope};

/// Index of a node inside a [`ResolvedTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(usize);

impl NodeIdx {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Present when version mediation superseded this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMarker {
    /// Version that won mediation, when the resolver reports it.
    pub winner_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode {
    pub coordinate: Coordinate,
    pub packaging: String,
    pub scope: Scope,
    pub optional: bool,
    pub conflict: Option<ConflictMarker>,
    children: Vec<NodeIdx>,
}

impl RawNode {
    #[must_use]
    pub fn children(&self) -> &[NodeIdx] {
        &self.children
    }

    #[must_use]
    pub const fn is_conflicted(&self) -> bool {
        self.conflict.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTree {
    nodes: Vec<RawNode>,
}

impl ResolvedTree {
    /// The exporting build unit.
    #[must_use]
    pub fn root(&self) -> &RawNode {
        &self.nodes[0]
    }

    #[must_use]
    pub const fn root_idx(&self) -> NodeIdx {
        NodeIdx(0)
    }

    /// Look up a node by index.
    ///
    /// # Panics
    ///
    /// Panics if `idx` was not produced for this tree.
    #[must_use]
    pub fn node(&self, idx: NodeIdx) -> &RawNode {
        &self.nodes[idx.0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parse the resolver's nested JSON tree.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidInput`] for malformed JSON or an unknown
    /// scope.
    pub fn from_json_str(json: &str) -> Result<Self, ExportError> {
        let raw: RawJsonNode = serde_json::from_str(json)
            .map_err(|err| ExportError::InvalidInput(format!("resolver tree: {err}")))?;
        Self::from_raw(raw)
    }

    /// Same as [`Self::from_json_str`], reading from any byte source.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidInput`] for I/O failures, malformed JSON
    /// or an unknown scope.
    pub fn from_json_reader(reader: impl Read) -> Result<Self, ExportError> {
        let raw: RawJsonNode = serde_json::from_reader(reader)
            .map_err(|err| ExportError::InvalidInput(format!("resolver tree: {err}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(root: RawJsonNode) -> Result<Self, ExportError> {
        let mut builder = TreeBuilder::new(root.coordinate(), root.packaging());
        let root_idx = builder.root();

        // Iterative to keep very deep trees off the call stack.
        let mut pending: Vec<(NodeIdx, RawJsonNode)> = root
            .children
            .into_iter()
            .rev()
            .map(|child| (root_idx, child))
            .collect();

        while let Some((parent, node)) = pending.pop() {
            let scope = node.scope()?;
            let conflict = node
                .omitted_for_conflict_with
                .as_ref()
                .map(|winner| ConflictMarker {
                    winner_version: Some(winner.clone()).filter(|w| !w.is_empty()),
                });
            let idx = builder.add_child(
                parent,
                RawNodeSpec {
                    coordinate: node.coordinate(),
                    packaging: node.packaging(),
                    scope,
                    optional: node.optional,
                    conflict,
                },
            );
            pending.extend(node.children.into_iter().rev().map(|child| (idx, child)));
        }

        Ok(builder.build())
    }
}

/// Attributes of a node added through [`TreeBuilder::add_child`].
#[derive(Debug, Clone)]
pub struct RawNodeSpec {
    pub coordinate: Coordinate,
    pub packaging: String,
    pub scope: Scope,
    pub optional: bool,
    pub conflict: Option<ConflictMarker>,
}

impl RawNodeSpec {
    /// A resolved, non-optional compile dependency packaged as a jar.
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            packaging: DEFAULT_PACKAGING.to_string(),
            scope: Scope::Compile,
            optional: false,
            conflict: None,
        }
    }

    #[must_use]
    pub const fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub const fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Mark the node as superseded by `winner`.
    #[must_use]
    pub fn conflicted_with(mut self, winner: impl Into<String>) -> Self {
        self.conflict = Some(ConflictMarker {
            winner_version: Some(winner.into()),
        });
        self
    }
}

/// Incremental arena construction.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<RawNode>,
}

impl TreeBuilder {
    pub fn new(root: Coordinate, packaging: impl Into<String>) -> Self {
        Self {
            nodes: vec![RawNode {
                coordinate: root,
                packaging: packaging.into(),
                scope: Scope::Compile,
                optional: false,
                conflict: None,
                children: Vec::new(),
            }],
        }
    }

    #[must_use]
    pub const fn root(&self) -> NodeIdx {
        NodeIdx(0)
    }

    /// Append a fresh node under `parent` and return its index.
    pub fn add_child(&mut self, parent: NodeIdx, spec: RawNodeSpec) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len());
        self.nodes.push(RawNode {
            coordinate: spec.coordinate,
            packaging: spec.packaging,
            scope: spec.scope,
            optional: spec.optional,
            conflict: spec.conflict,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(idx);
        idx
    }

    /// Reference an existing node as an additional child of `parent`.
    ///
    /// This is how cycles enter the arena.
    pub fn link(&mut self, parent: NodeIdx, child: NodeIdx) {
        self.nodes[parent.0].children.push(child);
    }

    #[must_use]
    pub fn build(self) -> ResolvedTree {
        ResolvedTree { nodes: self.nodes }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJsonNode {
    group_id: String,
    artifact_id: String,
    version: String,
    #[serde(default, rename = "type", alias = "packaging")]
    packaging: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    optional: bool,
    #[serde(default)]
    omitted_for_conflict_with: Option<String>,
    #[serde(default)]
    children: Vec<RawJsonNode>,
}

impl RawJsonNode {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(&self.group_id, &self.artifact_id, &self.version)
    }

    fn packaging(&self) -> String {
        self.packaging
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PACKAGING.to_string())
    }

    fn scope(&self) -> Result<Scope, ExportError> {
        match self.scope.as_deref().map(str::trim) {
            None | Some("") => Ok(Scope::default()),
            Some(raw) => raw.parse::<Scope>().map_err(|err| {
                ExportError::InvalidInput(format!("{}: {err}", self.coordinate()))
            }),
        }
    }
}

// Resolver dumps disagree on whether `optional` is a JSON bool or a string.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => Ok(text.trim().eq_ignore_ascii_case("true")),
    }
}
