//! Metadata registry: provenance stored in node metadata bags.
//!
//! Two record kinds live on tools:
//! - containers (`avalon.*`), imprinted by loaders and listed by the scene
//!   inventory;
//! - publish instances (`openpype.*`), imprinted on Saver tools by creators
//!   and recovered on the next publish run.
//!
//! Re-imprinting never clears keys from an earlier imprint: a key that the
//! new write set does not contain keeps its old value (last write wins per
//! key).

use log::{debug, warn};
use serde_json::Value;

use crate::entities::keys::*;
use crate::entities::{AttrValue, Attrs, Comp, Container, Instance, Tool, ToolRef};

/// Keys a bag must carry to be a container.
pub const REQUIRED_CONTAINER_KEYS: [&str; 6] =
    ["schema", "id", "name", "namespace", "loader", "representation"];

/// Copied through only when present.
pub const OPTIONAL_CONTAINER_KEYS: [&str; 1] = ["project_name"];

/// What a loader knows about the representation it loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentationContext {
    pub representation_id: String,
    pub project_name: String,
}

/// Imprint container metadata on a tool.
pub fn imprint_container(
    tool: &dyn Tool,
    name: &str,
    namespace: &str,
    context: &RepresentationContext,
    loader: &str,
) {
    let data: [(&str, AttrValue); 7] = [
        ("schema", CONTAINER_SCHEMA.into()),
        ("id", AVALON_CONTAINER_ID.into()),
        ("name", name.into()),
        ("namespace", namespace.into()),
        ("loader", loader.into()),
        ("representation", context.representation_id.as_str().into()),
        ("project_name", context.project_name.as_str().into()),
    ];

    for (key, value) in data {
        tool.set_data(&format!("{}.{}", NS_AVALON, key), value);
    }
    debug!("Imprinted container '{}' on {}", name, tool.name());
}

/// Read the container imprinted on `tool`, `None` when the bag is missing,
/// not a mapping, or lacks any required key.
pub fn parse_container(tool: &ToolRef) -> Option<Container> {
    let data = tool.get_data(NS_AVALON)?;
    let bag = data.as_map()?;

    if !REQUIRED_CONTAINER_KEYS.iter().all(|key| bag.contains_key(*key)) {
        return None;
    }

    let text = |key: &str| bag.get(key).map(AttrValue::to_text).unwrap_or_default();
    let project_name = OPTIONAL_CONTAINER_KEYS
        .first()
        .and_then(|key| bag.get(*key))
        .map(AttrValue::to_text);

    Some(Container {
        schema: text("schema"),
        id: text("id"),
        name: text("name"),
        namespace: text("namespace"),
        loader: text("loader"),
        representation: text("representation"),
        project_name,
        object_name: tool.name(),
        tool: tool.clone(),
    })
}

/// All containers in the comp, in host tool order.
///
/// Each call re-enumerates the comp; the iterator is lazy over that
/// snapshot.
pub fn list_containers(comp: &dyn Comp) -> impl Iterator<Item = Container> + use<> {
    comp.tools(false, None)
        .into_iter()
        .filter_map(|tool| parse_container(&tool))
}

/// Point an existing container at another representation (update/switch).
pub fn update_container_representation(container: &Container, representation_id: &str) {
    container
        .tool
        .set_data(&format!("{}.representation", NS_AVALON), representation_id.into());
}

/// Persist an instance on its tool under `openpype.*`.
///
/// `instance_id` is not stored (the tool name is the id) and `active` is
/// expressed as the tool's passthrough state.
pub fn imprint_instance(tool: &dyn Tool, instance: &Instance) {
    let mut data = match serde_json::to_value(instance) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("Unable to serialize instance {}", instance.product_name);
            return;
        }
    };

    data.remove("instance_id");
    if let Some(active) = data.remove("active").and_then(|v| v.as_bool()) {
        tool.set_attrs(&Attrs::new().with(TOOLB_PASS_THROUGH, !active));
    }

    for (key, value) in data.iter() {
        if let Some(value) = AttrValue::from_json(value) {
            tool.set_data(&format!("{}.{}", NS_OPENPYPE, key), value);
        }
    }
}

/// Recover the instance persisted on `tool` by `creator_identifier`.
pub fn read_instance(tool: &ToolRef, creator_identifier: &str) -> Option<Instance> {
    let data = tool.get_data(NS_OPENPYPE)?;
    let Value::Object(mut map) = data.to_json() else {
        return None;
    };

    let identifier_matches =
        map.get("creator_identifier").and_then(Value::as_str) == Some(creator_identifier);
    let id_matches = matches!(
        map.get("id").and_then(Value::as_str),
        Some(AYON_INSTANCE_ID) | Some(AVALON_INSTANCE_ID)
    );
    if !identifier_matches || !id_matches {
        return None;
    }

    let passthrough = tool.get_attrs().get_bool_or(TOOLB_PASS_THROUGH, false);
    map.insert("active".to_string(), Value::Bool(!passthrough));
    // Tool names are unique within a comp
    map.insert("instance_id".to_string(), Value::String(tool.name()));

    match serde_json::from_value::<Instance>(Value::Object(map)) {
        Ok(mut instance) => {
            instance.tool = Some(tool.clone());
            Some(instance)
        }
        Err(e) => {
            warn!("Invalid instance data on {}: {}", tool.name(), e);
            None
        }
    }
}

/// All instances of `creator_identifier` on Saver tools of the comp.
pub fn collect_instances(comp: &dyn Comp, creator_identifier: &str) -> Vec<Instance> {
    comp.tools(false, Some(TOOL_SAVER))
        .iter()
        .filter_map(|tool| read_instance(tool, creator_identifier))
        .collect()
}

/// Store pipeline context data on the comp itself.
pub fn update_context_data(comp: &dyn Comp, data: &Value) {
    if let Some(value) = AttrValue::from_json(data) {
        comp.set_data(NS_OPENPYPE, value);
    }
}

/// Pipeline context data stored on the comp, empty object when unset.
pub fn get_context_data(comp: &dyn Comp) -> Value {
    comp.get_data(NS_OPENPYPE)
        .map(|v| v.to_json())
        .unwrap_or_else(|| Value::Object(Default::default()))
}
