//! Saver creators: publish instances backed by Saver tools.
//!
//! The render (sequence) and image (single frame) creators differ only in
//! identifier, product type and settings. Instances live on their Saver
//! under `openpype.*` (see `registry::imprint_instance`).

use std::path::Path;

use log::{info, warn};

use super::registry::{collect_instances, imprint_instance};
use super::undo::lock_and_undo_chunk;
use crate::config::{CreateSettings, SaverCreatorSettings};
use crate::entities::keys::*;
use crate::entities::{AttrValue, Attrs, Comp, HostError, Instance, Tool};

pub const SAVER_CREATOR: &str = "io.openpype.creators.fusion.saver";
pub const IMAGE_SAVER_CREATOR: &str = "io.openpype.creators.fusion.imagesaver";

#[derive(Debug, Clone, PartialEq)]
pub enum CreatorError {
    Host(HostError),
    /// Instance was never bound to a Saver tool
    NoTool(String),
    /// No working directory for the instance's folder/task
    NoWorkdir(String),
}

impl std::fmt::Display for CreatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreatorError::Host(e) => write!(f, "{}", e),
            CreatorError::NoTool(name) => write!(f, "Instance '{}' has no Saver tool", name),
            CreatorError::NoWorkdir(name) => {
                write!(f, "Unable to resolve work directory for instance '{}'", name)
            }
        }
    }
}

impl std::error::Error for CreatorError {}

impl From<HostError> for CreatorError {
    fn from(e: HostError) -> Self {
        CreatorError::Host(e)
    }
}

/// `render` + `main` -> `renderMain`
pub fn product_name(product_type: &str, variant: &str) -> String {
    let mut chars = variant.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", product_type, first.to_uppercase(), chars.as_str()),
        None => product_type.to_string(),
    }
}

pub struct SaverCreator {
    pub identifier: &'static str,
    pub product_type: &'static str,
    settings: SaverCreatorSettings,
    frame_padding: usize,
}

impl SaverCreator {
    /// Image sequence creator (`render` product type).
    pub fn render(settings: &CreateSettings) -> Self {
        Self {
            identifier: SAVER_CREATOR,
            product_type: "render",
            settings: settings.create_saver.clone(),
            frame_padding: settings.frame_padding,
        }
    }

    /// Single frame creator (`image` product type).
    pub fn image(settings: &CreateSettings) -> Self {
        Self {
            identifier: IMAGE_SAVER_CREATOR,
            product_type: "image",
            settings: settings.create_image_saver.clone(),
            frame_padding: settings.frame_padding,
        }
    }

    pub fn settings(&self) -> &SaverCreatorSettings {
        &self.settings
    }

    /// Fresh instance with the creator page defaults.
    pub fn new_instance(
        &self,
        comp: Option<&dyn Comp>,
        variant: &str,
        folder_path: &str,
        task: &str,
    ) -> Instance {
        let name = product_name(self.product_type, variant);
        let mut instance = Instance::new(self.product_type, &name, folder_path, task);
        instance.variant = variant.to_string();
        instance.creator_identifier = self.identifier.to_string();
        instance.creator_attributes = self.settings.default_creator_attributes(comp);
        instance
    }

    /// Add a Saver for `instance` and persist the instance on it.
    pub fn create(
        &self,
        comp: &dyn Comp,
        mut instance: Instance,
        workdir: &Path,
    ) -> Result<Instance, CreatorError> {
        instance.creator_identifier = self.identifier.to_string();
        let target = instance.creator_attributes.render_target;
        if !self.settings.render_targets().contains(&target) {
            warn!(
                "Render target '{}' is not enabled for {}, using local",
                target.as_str(),
                instance.product_name
            );
            instance.creator_attributes.render_target = Default::default();
        }

        let tool = {
            let _chunk = lock_and_undo_chunk(comp, "Create Saver", true);
            let tool = comp.add_tool(TOOL_SAVER)?;
            self.update_tool(comp, &*tool, &instance, workdir);
            tool
        };
        imprint_instance(&*tool, &instance);

        info!("Created {} instance on {}", instance.product_name, tool.name());
        instance.instance_id = Some(tool.name());
        instance.tool = Some(tool);
        Ok(instance)
    }

    /// Instances of this creator found on the comp's Savers.
    pub fn collect(&self, comp: &dyn Comp) -> Vec<Instance> {
        collect_instances(comp, self.identifier)
    }

    /// Write instance changes back to its Saver.
    pub fn update(
        &self,
        comp: &dyn Comp,
        instance: &Instance,
        workdir: &Path,
    ) -> Result<(), CreatorError> {
        let tool = instance
            .tool
            .as_ref()
            .ok_or_else(|| CreatorError::NoTool(instance.product_name.clone()))?;
        self.update_tool(comp, &**tool, instance, workdir);
        imprint_instance(&**tool, instance);
        Ok(())
    }

    /// Delete the Saver of every instance.
    pub fn remove(&self, instances: &[Instance]) {
        for instance in instances {
            if let Some(tool) = &instance.tool {
                info!("Removing {} ({})", instance.product_name, tool.name());
                tool.delete();
            }
        }
    }

    /// Reconfigure the Saver when anything its output path depends on
    /// changed since the last imprint.
    fn update_tool(&self, comp: &dyn Comp, tool: &dyn Tool, instance: &Instance, workdir: &Path) {
        let stored = |key: &str| {
            tool.get_data(&format!("{}.{}", NS_OPENPYPE, key))
                .and_then(|v| v.as_str().map(str::to_string))
        };
        let stored_format = tool
            .get_data(&format!("{}.creator_attributes", NS_OPENPYPE))
            .and_then(|v| v.as_map().and_then(|m| m.get("image_format")).cloned())
            .and_then(|v| v.as_str().map(str::to_string));

        let changed = stored("productName").as_deref() != Some(instance.product_name.as_str())
            || stored("task").as_deref() != Some(instance.task.as_str())
            || stored("folderPath").as_deref() != Some(instance.folder_path.as_str())
            || stored_format.as_deref() != Some(instance.creator_attributes.image_format.as_str());
        if changed {
            self.configure_saver(comp, tool, instance, workdir);
        }
    }

    fn configure_saver(
        &self,
        comp: &dyn Comp,
        tool: &dyn Tool,
        instance: &Instance,
        workdir: &Path,
    ) {
        let path = self.settings.rendering_path(
            workdir,
            &instance.product_name,
            &instance.product_type,
            &instance.creator_attributes.image_format,
            self.frame_padding,
        );
        let clip = comp.reverse_map_path(&path.to_string_lossy());
        tool.set_input(INPUT_CLIP, None, AttrValue::from(clip));

        let current = tool.name();
        if current != instance.product_name {
            info!("Renaming {} -> {}", current, instance.product_name);
            tool.set_attrs(&Attrs::new().with(TOOLS_NAME, instance.product_name.as_str()));
        }
    }
}
