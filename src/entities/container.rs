//! Container: provenance record of a loaded asset, projected from a tool's
//! `avalon` metadata bag.

use super::host::ToolRef;

/// Read-only projection of a tool's `avalon.*` metadata.
#[derive(Clone)]
pub struct Container {
    pub schema: String,
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// Identifier of the loader that produced the container
    pub loader: String,
    pub representation: String,
    /// Only present when it was imprinted
    pub project_name: Option<String>,
    /// Tool display name at parse time
    pub object_name: String,
    /// Back-reference to the node carrying the metadata
    pub tool: ToolRef,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("schema", &self.schema)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("loader", &self.loader)
            .field("representation", &self.representation)
            .field("project_name", &self.project_name)
            .field("object_name", &self.object_name)
            .finish()
    }
}
