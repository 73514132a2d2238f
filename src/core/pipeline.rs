//! Pipeline host: lifecycle handlers and the workfile API.
//!
//! `FusionPipeline` owns the collaborators and the [`SaveContextState`].
//! Canonical events reach it through [`FusionPipeline::process_events`],
//! which pumps the bridge and drains the bus on the scripting thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use serde_json::Value;

use super::bridge::EventBridge;
use super::context_change::SaveContextState;
use super::creator::{CreatorError, SaverCreator};
use super::event_bus::downcast_event;
use super::reconcile::{prompt_reset_context, validate_comp_prefs};
use super::registry::{self, list_containers};
use super::render::{
    PublishValidationError, RenderWorkItem, collect_render_instances, validate_saver_resolution,
};
use crate::config::{ENV_WORKDIR, Settings};
use crate::entities::{
    CanonicalEvent, CompRef, Container, CreationContext, FusionApp, HostError, Instance, Inventory,
    Prompter, TaskChange, TaskContext,
};

/// Workfile extensions handled by this host.
pub const WORKFILE_EXTENSIONS: [&str; 1] = [".comp"];

pub struct FusionPipeline {
    app: Arc<dyn FusionApp>,
    context: Arc<dyn TaskContext>,
    creation: Arc<dyn CreationContext>,
    prompter: Arc<dyn Prompter>,
    inventory: Arc<dyn Inventory>,
    settings: Settings,
    save_state: SaveContextState,
}

impl FusionPipeline {
    pub fn new(
        app: Arc<dyn FusionApp>,
        context: Arc<dyn TaskContext>,
        creation: Arc<dyn CreationContext>,
        prompter: Arc<dyn Prompter>,
        inventory: Arc<dyn Inventory>,
        settings: Settings,
    ) -> Self {
        Self {
            app,
            context,
            creation,
            prompter,
            inventory,
            settings,
            save_state: SaveContextState::default(),
        }
    }

    /// Register host notifications and start polling at the configured
    /// interval.
    pub fn install(&self) -> anyhow::Result<EventBridge> {
        let interval = Duration::from_millis(self.settings.callback_interval_ms);
        let mut bridge = EventBridge::install(Arc::clone(&self.app), interval)
            .context("Failed to register Fusion notifications")?;
        bridge.start().context("Failed to start notification poller")?;
        info!(
            "Installed Fusion pipeline (poll interval {} ms)",
            self.settings.callback_interval_ms
        );
        Ok(bridge)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn save_state(&self) -> SaveContextState {
        self.save_state
    }

    /// Working directory root, resolved on every call: settings override,
    /// else the task context, else `AYON_WORKDIR`.
    pub fn workdir(&self) -> Option<PathBuf> {
        self.settings
            .workdir
            .clone()
            .or_else(|| self.context.workdir())
            .or_else(|| std::env::var_os(ENV_WORKDIR).filter(|v| !v.is_empty()).map(PathBuf::from))
    }

    /// Pump the bridge and handle every queued canonical event in order.
    /// Returns the number of events handled.
    pub fn process_events(&mut self, bridge: &EventBridge) -> usize {
        bridge.pump();
        let events = bridge.bus().poll();
        let mut handled = 0;
        for event in &events {
            if let Some(event) = downcast_event::<CanonicalEvent>(event) {
                self.handle_event(event);
                handled += 1;
            }
        }
        handled
    }

    pub fn handle_event(&mut self, event: &CanonicalEvent) {
        debug!("Handling '{}' event", event.topic());
        let comp = event.comp().cloned();
        match event {
            CanonicalEvent::Opened(_) => self.on_opened(comp),
            CanonicalEvent::Saved(_) => self.on_saved(comp),
            CanonicalEvent::Created(_) => self.on_created(comp),
            CanonicalEvent::TaskChanged(change) => self.on_task_changed(change),
        }
    }

    fn event_comp(&self, comp: Option<CompRef>) -> Option<CompRef> {
        comp.or_else(|| self.app.current_comp())
    }

    fn on_opened(&mut self, comp: Option<CompRef>) {
        let Some(comp) = self.event_comp(comp) else {
            return;
        };
        validate_comp_prefs(&comp, &*self.context, &*self.prompter, false);

        let containers: Vec<Container> = list_containers(&*comp).collect();
        if self.inventory.any_outdated(&containers) {
            warn!("Scene has outdated content.");
            self.prompter.show_outdated_containers();
        }
    }

    fn on_saved(&mut self, comp: Option<CompRef>) {
        if let Some(comp) = self.event_comp(comp) {
            validate_comp_prefs(&comp, &*self.context, &*self.prompter, false);
        }
        self.save_state.on_saved();
    }

    fn on_created(&mut self, comp: Option<CompRef>) {
        if let Some(comp) = self.event_comp(comp) {
            validate_comp_prefs(&comp, &*self.context, &*self.prompter, true);
        }
    }

    fn on_task_changed(&mut self, change: &TaskChange) {
        info!(
            "Task changed to {} > {} (save pending: {})",
            change.folder_path,
            change.task_name,
            self.save_state.is_save_pending()
        );
        if !self.save_state.is_save_pending() {
            return;
        }
        // Left pending: the following `saved` event clears it
        if let Some(comp) = self.app.current_comp() {
            prompt_reset_context(&*comp, &*self.context, &*self.creation, &*self.prompter);
        }
    }

    /// Hook run by the workfile tool right before it saves.
    pub fn before_workfile_save(&mut self) -> bool {
        let file = self.current_workfile();
        let workdir = self.workdir();
        self.save_state.before_save(file.as_deref(), workdir.as_deref())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.app.current_comp().is_some_and(|comp| comp.is_modified())
    }

    pub fn workfile_extensions(&self) -> &'static [&'static str] {
        &WORKFILE_EXTENSIONS
    }

    pub fn save_workfile(&self, path: Option<&Path>) -> Result<(), HostError> {
        let comp = self.app.current_comp().ok_or(HostError::NotConnected)?;
        comp.save(path)
    }

    pub fn open_workfile(&self, path: &Path) -> Result<CompRef, HostError> {
        self.app.load_comp(path)
    }

    pub fn current_workfile(&self) -> Option<PathBuf> {
        self.app.current_comp().and_then(|comp| comp.file_name())
    }

    pub fn get_containers(&self) -> Vec<Container> {
        self.app
            .current_comp()
            .map(|comp| list_containers(&*comp).collect())
            .unwrap_or_default()
    }

    pub fn update_context_data(&self, data: &Value) {
        if let Some(comp) = self.app.current_comp() {
            registry::update_context_data(&*comp, data);
        }
    }

    pub fn get_context_data(&self) -> Value {
        self.app
            .current_comp()
            .map(|comp| registry::get_context_data(&*comp))
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Render and image Saver creators configured by settings.
    pub fn saver_creators(&self) -> [SaverCreator; 2] {
        [
            SaverCreator::render(&self.settings.create),
            SaverCreator::image(&self.settings.create),
        ]
    }

    /// Create a Saver instance for the current folder and task.
    pub fn create_saver(
        &self,
        creator: &SaverCreator,
        variant: &str,
    ) -> Result<Instance, CreatorError> {
        let comp = self.app.current_comp().ok_or(HostError::NotConnected)?;
        let instance = creator.new_instance(
            Some(&*comp),
            variant,
            &self.context.current_folder_path(),
            &self.context.current_task_name(),
        );
        let workdir = self
            .workdir()
            .ok_or_else(|| CreatorError::NoWorkdir(instance.product_name.clone()))?;
        creator.create(&*comp, instance, &workdir)
    }

    /// Saver instances of every creator in the current comp.
    pub fn collect_saver_instances(&self) -> Vec<Instance> {
        let Some(comp) = self.app.current_comp() else {
            return Vec::new();
        };
        self.saver_creators()
            .iter()
            .flat_map(|creator| creator.collect(&*comp))
            .collect()
    }

    /// Write changed Saver instances back to their tools. Instances of
    /// other creators are skipped.
    pub fn update_saver_instances(&self, instances: &[Instance]) -> Result<(), CreatorError> {
        let comp = self.app.current_comp().ok_or(HostError::NotConnected)?;
        let creators = self.saver_creators();
        for instance in instances {
            let Some(creator) = creators
                .iter()
                .find(|c| c.identifier == instance.creator_identifier)
            else {
                continue;
            };
            let workdir = self
                .instance_workdir(instance)
                .ok_or_else(|| CreatorError::NoWorkdir(instance.product_name.clone()))?;
            creator.update(&*comp, instance, &workdir)?;
        }
        Ok(())
    }

    /// Delete the Savers of the given instances.
    pub fn remove_saver_instances(&self, instances: &[Instance]) {
        for creator in self.saver_creators() {
            let owned: Vec<Instance> = instances
                .iter()
                .filter(|i| i.creator_identifier == creator.identifier)
                .cloned()
                .collect();
            creator.remove(&owned);
        }
    }

    /// Current workdir for instances of the current context, else the
    /// workdir of the instance's own folder and task.
    fn instance_workdir(&self, instance: &Instance) -> Option<PathBuf> {
        if instance.folder_path == self.context.current_folder_path()
            && instance.task == self.context.current_task_name()
        {
            self.workdir()
        } else {
            self.context.workdir_for(&instance.folder_path, &instance.task)
        }
    }

    /// Render work for the creation context's instances in the current comp.
    pub fn collect_render_work(&self) -> Vec<RenderWorkItem> {
        let Some(comp) = self.app.current_comp() else {
            return Vec::new();
        };
        let task = self.context.current_task().ok();
        let instances: Vec<Instance> = self.creation.instances();
        collect_render_instances(&*comp, &instances, task.as_ref())
    }

    /// Publish validation of collected render work, skipped when disabled
    /// in settings.
    pub fn validate_render_work(
        &self,
        items: &[RenderWorkItem],
    ) -> Vec<(String, PublishValidationError)> {
        if !self.settings.publish.validate_saver_resolution.enabled {
            return Vec::new();
        }
        let (Some(comp), Ok(task)) = (self.app.current_comp(), self.context.current_task()) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                validate_saver_resolution(&*comp, item, &task)
                    .err()
                    .map(|e| (item.product_name.clone(), e))
            })
            .collect()
    }
}

/// Work root of a session: `workdir/scene_dir` when a scene dir is set.
pub fn work_root(workdir: &Path, scene_dir: Option<&str>) -> PathBuf {
    match scene_dir {
        Some(dir) if !dir.is_empty() => workdir.join(dir),
        _ => workdir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::{RepresentationContext, imprint_container};
    use crate::entities::keys::*;
    use crate::entities::{Comp, RawNotification, ResetOptions};
    use crate::testing::{
        FixedInventory, MemoryCreationContext, MockApp, MockComp, MockTool, RecordingPrompter,
        StaticTaskContext, task_entity,
    };
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct Fixture {
        comp: Arc<MockComp>,
        app: Arc<MockApp>,
        prompter: Arc<RecordingPrompter>,
        creation: Arc<MemoryCreationContext>,
        pipeline: FusionPipeline,
    }

    fn fixture(comp: Arc<MockComp>, outdated: bool, answer: Option<ResetOptions>) -> Fixture {
        let app = MockApp::new(Some(comp.clone() as CompRef), None);
        let prompter = RecordingPrompter::answering(answer);
        let creation = Arc::new(MemoryCreationContext::default());
        let pipeline = FusionPipeline::new(
            app.clone(),
            StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0)),
            creation.clone(),
            prompter.clone(),
            Arc::new(FixedInventory(outdated)),
            Settings::default(),
        );
        Fixture {
            comp,
            app,
            prompter,
            creation,
            pipeline,
        }
    }

    fn matching_comp() -> Arc<MockComp> {
        MockComp::with_format(25.0, 1920, 1080, 1.0, 1.0)
    }

    fn saved() -> CanonicalEvent {
        CanonicalEvent::Saved(RawNotification::new(ACTION_COMP_SAVE, json!({"success": true})))
    }

    fn task_changed() -> CanonicalEvent {
        CanonicalEvent::TaskChanged(TaskChange {
            folder_path: "/shots/sh020".into(),
            task_name: "comp".into(),
        })
    }

    #[test]
    fn test_created_forces_repair() {
        let mut f = fixture(MockComp::with_format(24.0, 1920, 1080, 1.0, 1.0), false, None);
        f.pipeline.handle_event(&CanonicalEvent::Created(RawNotification::new(
            ACTION_COMP_NEW,
            json!({}),
        )));
        assert_eq!(f.comp.pref(PREF_RATE).and_then(|v| v.as_f64()), Some(25.0));
        assert_eq!(f.prompter.repair_count(), 0);
    }

    #[test]
    fn test_saved_prompts_repair_without_mutation() {
        let mut f = fixture(MockComp::with_format(24.0, 1920, 1080, 1.0, 1.0), false, None);
        f.pipeline.handle_event(&saved());
        assert_eq!(f.comp.pref(PREF_RATE).and_then(|v| v.as_f64()), Some(24.0));
        assert_eq!(f.prompter.repair_count(), 1);
    }

    #[test]
    fn test_opened_reports_outdated_containers() {
        let comp = matching_comp();
        let tool = MockTool::new("Loader1", TOOL_LOADER);
        let repre = RepresentationContext {
            representation_id: "r1".into(),
            project_name: "show".into(),
        };
        imprint_container(&*tool, "plateMain", "sh010", &repre, "FusionLoadSequence");
        comp.add_mock_tool(tool);

        let mut f = fixture(comp, true, None);
        f.pipeline.handle_event(&CanonicalEvent::Opened(RawNotification::new(
            ACTION_COMP_OPENED,
            json!({}),
        )));
        assert_eq!(f.prompter.outdated_shown.load(Ordering::SeqCst), 1);

        let mut f = fixture(matching_comp(), false, None);
        f.pipeline.handle_event(&CanonicalEvent::Opened(RawNotification::new(
            ACTION_COMP_OPENED,
            json!({}),
        )));
        assert_eq!(f.prompter.outdated_shown.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_task_change_after_save_inside_workdir_prompts_reset() {
        let comp = matching_comp();
        comp.set_file_name("/projects/show/shots/sh010/work/comp/sh010_comp_v001.comp");
        let mut f = fixture(comp, false, Some(ResetOptions::default()));

        assert!(f.pipeline.before_workfile_save());
        f.pipeline.handle_event(&task_changed());
        assert_eq!(f.prompter.reset_prompts.load(Ordering::SeqCst), 1);
        assert_eq!(f.creation.saves.lock().unwrap().len(), 1);
        assert!(f.pipeline.save_state().is_save_pending());

        f.pipeline.handle_event(&saved());
        assert_eq!(f.pipeline.save_state(), SaveContextState::Idle);
    }

    #[test]
    fn test_process_events_drains_bridge() {
        let comp = matching_comp();
        comp.set_file_name("/projects/show/shots/sh010/work/comp/sh010_comp_v001.comp");
        let mut f = fixture(comp, false, None);
        let bridge = EventBridge::install(f.app.clone(), Duration::from_millis(10)).unwrap();

        f.pipeline.before_workfile_save();
        bridge.emit_task_changed(TaskChange {
            folder_path: "/shots/sh020".into(),
            task_name: "comp".into(),
        });
        assert_eq!(f.pipeline.process_events(&bridge), 1);
        // Cancelled prompt: nothing reset, still pending
        assert_eq!(f.prompter.reset_prompts.load(Ordering::SeqCst), 1);
        assert!(f.creation.saves.lock().unwrap().is_empty());
        assert_eq!(f.pipeline.process_events(&bridge), 0);
    }

    #[test]
    fn test_task_change_without_pending_save_is_ignored() {
        let comp = matching_comp();
        comp.set_file_name("/tmp/elsewhere.comp");
        let mut f = fixture(comp, false, Some(ResetOptions::default()));

        assert!(!f.pipeline.before_workfile_save());
        f.pipeline.handle_event(&task_changed());
        assert_eq!(f.prompter.reset_prompts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_workdir_setting_overrides_context() {
        let comp = matching_comp();
        comp.set_file_name("/mnt/override/sh010_comp_v001.comp");
        let mut f = fixture(comp, false, None);
        f.pipeline.settings.workdir = Some(PathBuf::from("/mnt/override"));
        assert!(f.pipeline.before_workfile_save());
    }

    #[test]
    fn test_workdir_follows_context_switch() {
        let comp = matching_comp();
        comp.set_file_name("/projects/show/shots/sh020/work/comp/sh020_comp_v001.comp");
        let app = MockApp::new(Some(comp as CompRef), None);

        let mut settings = Settings::default();
        settings.apply_env_with(|key| {
            (key == ENV_WORKDIR).then(|| "/projects/show/shots/sh010/work/comp".to_string())
        });
        let context = Arc::new(StaticTaskContext {
            task: task_entity(25.0, 1920, 1080, 1.0),
            folder_path: "/shots/sh020".to_string(),
            workdir: Some(PathBuf::from("/projects/show/shots/sh020/work/comp")),
        });
        let mut pipeline = FusionPipeline::new(
            app,
            context,
            Arc::new(MemoryCreationContext::default()),
            RecordingPrompter::answering(None),
            Arc::new(FixedInventory(false)),
            settings,
        );

        assert_eq!(pipeline.workdir(), Some(PathBuf::from("/projects/show/shots/sh020/work/comp")));
        assert!(pipeline.before_workfile_save());
    }

    #[test]
    fn test_workfile_api() {
        let comp = matching_comp();
        comp.set_attr(COMPB_MODIFIED, true);
        let f = fixture(comp, false, None);

        assert!(f.pipeline.has_unsaved_changes());
        assert_eq!(f.pipeline.workfile_extensions(), &[".comp"]);
        assert_eq!(f.pipeline.current_workfile(), None);

        let path = Path::new("/work/sh010_comp_v002.comp");
        f.pipeline.save_workfile(Some(path)).unwrap();
        assert_eq!(f.pipeline.current_workfile(), Some(path.to_path_buf()));

        let opened = f.pipeline.open_workfile(Path::new("/work/other.comp")).unwrap();
        assert_eq!(opened.name(), "Loaded");
        assert_eq!(f.pipeline.current_workfile(), Some(PathBuf::from("/work/other.comp")));
        assert!(f.app.current_comp().is_some());
    }

    #[test]
    fn test_context_data_without_comp() {
        let app = MockApp::new(None, None);
        let pipeline = FusionPipeline::new(
            app,
            StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0)),
            Arc::new(MemoryCreationContext::default()),
            RecordingPrompter::answering(None),
            Arc::new(FixedInventory(false)),
            Settings::default(),
        );
        assert_eq!(pipeline.get_context_data(), json!({}));
        assert!(pipeline.get_containers().is_empty());
        assert!(!pipeline.has_unsaved_changes());
        assert_eq!(pipeline.save_workfile(None), Err(HostError::NotConnected));
    }

    #[test]
    fn test_context_data_roundtrip() {
        let f = fixture(matching_comp(), false, None);
        f.pipeline
            .update_context_data(&json!({"publish_attributes": {"ValidateX": {"active": false}}}));
        assert_eq!(
            f.pipeline.get_context_data(),
            json!({"publish_attributes": {"ValidateX": {"active": false}}})
        );
    }

    #[test]
    fn test_render_work_validation() {
        let comp = matching_comp();
        let tool = MockTool::new("Saver1", TOOL_SAVER);
        tool.set_evaluation("self.Input.OriginalWidth", 1280_i64);
        tool.set_evaluation("self.Input.OriginalHeight", 720_i64);
        tool.set_input_value(INPUT_CLIP, "Comp:/renders/renderMain.0000.exr");
        comp.add_mock_tool(tool.clone());

        let f = fixture(comp, false, None);
        let mut instance = Instance::new("render", "renderMain", "/shots/sh010", "comp");
        instance.tool = Some(tool as crate::entities::ToolRef);
        *f.creation.instances.lock().unwrap() = vec![instance];

        let items = f.pipeline.collect_render_work();
        assert_eq!(items.len(), 1);
        let errors = f.pipeline.validate_render_work(&items);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].1,
            PublishValidationError::ResolutionMismatch {
                expected: (1920, 1080),
                actual: (1280, 720)
            }
        );
    }

    #[test]
    fn test_saver_instance_lifecycle() {
        let f = fixture(matching_comp(), false, None);
        let [render, image] = f.pipeline.saver_creators();

        let main = f.pipeline.create_saver(&render, "Main").unwrap();
        f.pipeline.create_saver(&image, "Still").unwrap();
        assert_eq!(main.folder_path, "/shots/sh010");
        assert_eq!(main.task, "comp");

        let mut collected = f.pipeline.collect_saver_instances();
        let names: Vec<&str> = collected.iter().map(|i| i.product_name.as_str()).collect();
        assert_eq!(names, vec!["renderMain", "imageStill"]);

        // Moved to another shot: output goes to that shot's workdir
        collected[0].folder_path = "/shots/sh020".to_string();
        f.pipeline.update_saver_instances(&collected).unwrap();
        let clip = f.comp.tools(false, Some(TOOL_SAVER))[0]
            .input(INPUT_CLIP, None)
            .map(|v| v.to_text());
        assert_eq!(
            clip.as_deref(),
            Some("Comp:/shots/sh020/work/comp/renders/fusion/renderMain/renderMain.0000.exr")
        );

        f.pipeline.remove_saver_instances(&collected[..1]);
        let left: Vec<String> = f
            .pipeline
            .collect_saver_instances()
            .into_iter()
            .map(|i| i.product_name)
            .collect();
        assert_eq!(left, vec!["imageStill"]);
    }

    #[test]
    fn test_create_saver_without_comp() {
        let app = MockApp::new(None, None);
        let pipeline = FusionPipeline::new(
            app,
            StaticTaskContext::new(task_entity(25.0, 1920, 1080, 1.0)),
            Arc::new(MemoryCreationContext::default()),
            RecordingPrompter::answering(None),
            Arc::new(FixedInventory(false)),
            Settings::default(),
        );
        let [render, _] = pipeline.saver_creators();
        assert_eq!(
            pipeline.create_saver(&render, "Main").unwrap_err(),
            CreatorError::Host(HostError::NotConnected)
        );
        assert!(pipeline.collect_saver_instances().is_empty());
    }

    #[test]
    fn test_work_root() {
        assert_eq!(work_root(Path::new("/w"), Some("scenes")), PathBuf::from("/w/scenes"));
        assert_eq!(work_root(Path::new("/w"), None), PathBuf::from("/w"));
        assert_eq!(work_root(Path::new("/w"), Some("")), PathBuf::from("/w"));
    }
}
