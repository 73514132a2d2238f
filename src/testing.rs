//! In-memory fakes of the host bridge and pipeline collaborators.
//!
//! Only compiled for tests. The fakes record every mutating call so tests
//! can assert on ordering (lock/undo pairing) as well as on state.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::entities::keys::*;
use crate::entities::{
    AttrValue, Attrs, Comp, CompRef, Container, ContextError, CreateError, CreationContext,
    FusionApp, HostError, Instance, Inventory, NotificationSource, Prompter, RawNotification,
    RepairRequest, ResetOptions, TaskAttributes, TaskContext, TaskEntity, Tool, ToolRef,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Flat dotted-key metadata store with Fusion's namespace read semantics.
#[derive(Default)]
struct DataStore {
    entries: Mutex<IndexMap<String, AttrValue>>,
}

impl DataStore {
    fn get(&self, key: &str) -> Option<AttrValue> {
        let entries = lock(&self.entries);
        if let Some(v) = entries.get(key) {
            return Some(v.clone());
        }
        let prefix = format!("{}.", key);
        let bag: IndexMap<String, AttrValue> = entries
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|rest| (rest.to_string(), v.clone())))
            .collect();
        if bag.is_empty() { None } else { Some(AttrValue::Map(bag)) }
    }

    fn set(&self, key: &str, value: AttrValue) {
        lock(&self.entries).insert(key.to_string(), value);
    }
}

pub struct MockTool {
    name: Mutex<String>,
    tool_type: String,
    attrs: Mutex<Attrs>,
    data: DataStore,
    inputs: Mutex<HashMap<String, AttrValue>>,
    expressions: Mutex<HashMap<String, String>>,
    /// expression -> evaluated value
    evaluations: Mutex<HashMap<String, AttrValue>>,
    pub loaded_settings: Mutex<Vec<PathBuf>>,
    pub deleted: Mutex<bool>,
    pub calls: Mutex<Vec<String>>,
}

impl MockTool {
    pub fn new(name: &str, tool_type: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(name.to_string()),
            tool_type: tool_type.to_string(),
            attrs: Mutex::new(Attrs::new().with(TOOLB_PASS_THROUGH, false)),
            data: DataStore::default(),
            inputs: Mutex::new(HashMap::new()),
            expressions: Mutex::new(HashMap::new()),
            evaluations: Mutex::new(HashMap::new()),
            loaded_settings: Mutex::new(Vec::new()),
            deleted: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_raw_data(&self, key: &str, value: impl Into<AttrValue>) {
        self.data.set(key, value.into());
    }

    /// Value the host reports while `expression` is installed on an input.
    pub fn set_evaluation(&self, expression: &str, value: impl Into<AttrValue>) {
        lock(&self.evaluations).insert(expression.to_string(), value.into());
    }

    pub fn set_input_value(&self, input: &str, value: impl Into<AttrValue>) {
        lock(&self.inputs).insert(input.to_string(), value.into());
    }

    pub fn raw_input(&self, input: &str) -> Option<AttrValue> {
        lock(&self.inputs).get(input).cloned()
    }

    pub fn raw_expression(&self, input: &str) -> Option<String> {
        lock(&self.expressions).get(input).cloned()
    }

    pub fn data_keys(&self) -> Vec<String> {
        lock(&self.data.entries).keys().cloned().collect()
    }

    pub fn is_deleted(&self) -> bool {
        *lock(&self.deleted)
    }
}

impl Tool for MockTool {
    fn name(&self) -> String {
        lock(&self.name).clone()
    }

    fn tool_type(&self) -> String {
        self.tool_type.clone()
    }

    fn get_attrs(&self) -> Attrs {
        lock(&self.attrs).clone()
    }

    fn set_attrs(&self, attrs: &Attrs) {
        if let Some(name) = attrs.get_str(TOOLS_NAME) {
            *lock(&self.name) = name.to_string();
        }
        lock(&self.attrs).merge(attrs);
    }

    fn get_data(&self, key: &str) -> Option<AttrValue> {
        self.data.get(key)
    }

    fn set_data(&self, key: &str, value: AttrValue) {
        self.data.set(key, value);
    }

    fn input(&self, input: &str, _frame: Option<i64>) -> Option<AttrValue> {
        if let Some(expr) = lock(&self.expressions).get(input) {
            return lock(&self.evaluations).get(expr).cloned();
        }
        lock(&self.inputs).get(input).cloned()
    }

    fn set_input(&self, input: &str, _frame: Option<i64>, value: AttrValue) {
        lock(&self.calls).push(format!("set_input:{}", input));
        lock(&self.inputs).insert(input.to_string(), value);
    }

    fn expression(&self, input: &str) -> Option<String> {
        lock(&self.expressions).get(input).cloned()
    }

    fn set_expression(&self, input: &str, expression: Option<&str>) {
        let mut exprs = lock(&self.expressions);
        match expression {
            Some(e) => {
                exprs.insert(input.to_string(), e.to_string());
            }
            None => {
                exprs.remove(input);
            }
        }
    }

    fn load_settings(&self, path: &Path) -> Result<(), HostError> {
        lock(&self.loaded_settings).push(path.to_path_buf());
        Ok(())
    }

    fn delete(&self) {
        *lock(&self.deleted) = true;
    }
}

pub struct MockComp {
    name: String,
    attrs: Mutex<Attrs>,
    prefs: Mutex<Attrs>,
    data: DataStore,
    tools: Mutex<Vec<Arc<MockTool>>>,
    selected: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<String>>,
    pub saved: Mutex<Vec<Option<PathBuf>>>,
    pub pasted: Mutex<Vec<String>>,
    pub prefs_writes: AtomicUsize,
}

impl MockComp {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            attrs: Mutex::new(
                Attrs::new()
                    .with(COMPN_GLOBAL_START, 1001.0)
                    .with(COMPN_GLOBAL_END, 1100.0)
                    .with(COMPN_RENDER_START, 1001.0)
                    .with(COMPN_RENDER_END, 1100.0)
                    .with(COMPB_MODIFIED, false)
                    .with(COMPS_FILE_NAME, ""),
            ),
            prefs: Mutex::new(Attrs::new()),
            data: DataStore::default(),
            tools: Mutex::new(Vec::new()),
            selected: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            saved: Mutex::new(Vec::new()),
            pasted: Mutex::new(Vec::new()),
            prefs_writes: AtomicUsize::new(0),
        })
    }

    /// Comp with the given frame format preferences.
    pub fn with_format(
        fps: f64,
        width: i64,
        height: i64,
        aspect_x: f64,
        aspect_y: f64,
    ) -> Arc<Self> {
        let comp = Self::new("Composition1");
        {
            let mut prefs = lock(&comp.prefs);
            prefs.set(frame_format_key(PREF_RATE), fps);
            prefs.set(frame_format_key(PREF_WIDTH), width);
            prefs.set(frame_format_key(PREF_HEIGHT), height);
            prefs.set(frame_format_key(PREF_ASPECT_X), aspect_x);
            prefs.set(frame_format_key(PREF_ASPECT_Y), aspect_y);
        }
        comp
    }

    pub fn add_mock_tool(&self, tool: Arc<MockTool>) {
        lock(&self.tools).push(tool);
    }

    pub fn select(&self, name: &str) {
        lock(&self.selected).push(name.to_string());
    }

    pub fn set_file_name(&self, path: &str) {
        lock(&self.attrs).set(COMPS_FILE_NAME, path);
    }

    pub fn set_attr(&self, key: &str, value: impl Into<AttrValue>) {
        lock(&self.attrs).set(key, value);
    }

    pub fn pref(&self, key: &str) -> Option<AttrValue> {
        lock(&self.prefs).get(&frame_format_key(key)).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn mock_tools(&self) -> Vec<Arc<MockTool>> {
        lock(&self.tools).clone()
    }
}

impl Comp for MockComp {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn get_attrs(&self) -> Attrs {
        lock(&self.attrs).clone()
    }

    fn set_attrs(&self, attrs: &Attrs) {
        lock(&self.calls).push("set_attrs".to_string());
        lock(&self.attrs).merge(attrs);
    }

    fn get_prefs(&self, prefix: &str) -> Attrs {
        let p = format!("{}.", prefix);
        lock(&self.prefs)
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&p).map(|rest| (rest.to_string(), v.clone())))
            .collect()
    }

    fn set_prefs(&self, prefs: &Attrs) {
        self.prefs_writes.fetch_add(1, Ordering::SeqCst);
        lock(&self.prefs).merge(prefs);
    }

    fn lock(&self) {
        lock(&self.calls).push("lock".to_string());
    }

    fn unlock(&self) {
        lock(&self.calls).push("unlock".to_string());
    }

    fn start_undo(&self, name: &str) {
        lock(&self.calls).push(format!("start_undo:{}", name));
    }

    fn end_undo(&self, keep: bool) {
        lock(&self.calls).push(format!("end_undo:{}", keep));
    }

    fn tools(&self, selected_only: bool, tool_type: Option<&str>) -> Vec<ToolRef> {
        let selected = lock(&self.selected).clone();
        lock(&self.tools)
            .iter()
            .filter(|t| !t.is_deleted())
            .filter(|t| !selected_only || selected.contains(&t.name()))
            .filter(|t| tool_type.is_none_or(|ty| t.tool_type() == ty))
            .map(|t| t.clone() as ToolRef)
            .collect()
    }

    fn add_tool(&self, tool_type: &str) -> Result<ToolRef, HostError> {
        let count = lock(&self.tools).len() + 1;
        let tool = MockTool::new(&format!("{}{}", tool_type, count), tool_type);
        lock(&self.calls).push(format!("add_tool:{}", tool_type));
        lock(&self.tools).push(tool.clone());
        Ok(tool)
    }

    fn get_data(&self, key: &str) -> Option<AttrValue> {
        self.data.get(key)
    }

    fn set_data(&self, key: &str, value: AttrValue) {
        self.data.set(key, value);
    }

    fn map_path(&self, path: &str) -> String {
        match path.strip_prefix("Comp:/") {
            Some(rest) => format!("/projects/show/{}", rest),
            None => path.to_string(),
        }
    }

    fn reverse_map_path(&self, path: &str) -> String {
        match path.strip_prefix("/projects/show/") {
            Some(rest) => format!("Comp:/{}", rest),
            None => path.to_string(),
        }
    }

    fn save(&self, path: Option<&Path>) -> Result<(), HostError> {
        lock(&self.saved).push(path.map(Path::to_path_buf));
        if let Some(p) = path {
            self.set_file_name(&p.to_string_lossy());
        }
        Ok(())
    }

    fn paste(&self, contents: &str) -> Result<(), HostError> {
        lock(&self.pasted).push(contents.to_string());
        Ok(())
    }

    fn app_version(&self) -> String {
        "18.6".to_string()
    }
}

/// FIFO notification queue shared with the poller.
#[derive(Default)]
pub struct QueueSource {
    queue: Mutex<VecDeque<RawNotification>>,
    pub polls: AtomicUsize,
}

impl QueueSource {
    pub fn push(&self, notification: RawNotification) {
        lock(&self.queue).push_back(notification);
    }
}

impl NotificationSource for QueueSource {
    fn next_notification(&self) -> Option<RawNotification> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queue).pop_front()
    }
}

pub struct MockApp {
    current: Mutex<Option<CompRef>>,
    source: Option<Arc<QueueSource>>,
    pub notifies: Mutex<Vec<String>>,
    pub printed: Mutex<Vec<String>>,
}

impl MockApp {
    pub fn new(comp: Option<CompRef>, source: Option<Arc<QueueSource>>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(comp),
            source,
            notifies: Mutex::new(Vec::new()),
            printed: Mutex::new(Vec::new()),
        })
    }
}

impl FusionApp for MockApp {
    fn current_comp(&self) -> Option<CompRef> {
        lock(&self.current).clone()
    }

    fn load_comp(&self, path: &Path) -> Result<CompRef, HostError> {
        let comp = MockComp::new("Loaded");
        comp.set_file_name(&path.to_string_lossy());
        let comp: CompRef = comp;
        *lock(&self.current) = Some(comp.clone());
        Ok(comp)
    }

    fn add_notify(&self, action_id: &str) -> Result<(), HostError> {
        lock(&self.notifies).push(action_id.to_string());
        Ok(())
    }

    fn notification_source(&self) -> Option<Arc<dyn NotificationSource>> {
        self.source.clone().map(|s| s as Arc<dyn NotificationSource>)
    }

    fn print(&self, message: &str) {
        lock(&self.printed).push(message.to_string());
    }
}

pub fn task_entity(fps: f64, width: i64, height: i64, pixel_aspect: f64) -> TaskEntity {
    TaskEntity {
        name: "comp".to_string(),
        attributes: TaskAttributes {
            frame_start: 1001,
            frame_end: 1050,
            handle_start: Some(5),
            handle_end: Some(5),
            fps: Some(fps),
            resolution_width: width,
            resolution_height: height,
            pixel_aspect,
        },
    }
}

pub struct StaticTaskContext {
    pub task: TaskEntity,
    pub folder_path: String,
    pub workdir: Option<PathBuf>,
}

impl StaticTaskContext {
    pub fn new(task: TaskEntity) -> Arc<Self> {
        Arc::new(Self {
            task,
            folder_path: "/shots/sh010".to_string(),
            workdir: Some(PathBuf::from("/projects/show/shots/sh010/work/comp")),
        })
    }
}

impl TaskContext for StaticTaskContext {
    fn current_task(&self) -> Result<TaskEntity, ContextError> {
        Ok(self.task.clone())
    }

    fn current_folder_path(&self) -> String {
        self.folder_path.clone()
    }

    fn current_task_name(&self) -> String {
        self.task.name.clone()
    }

    fn workdir(&self) -> Option<PathBuf> {
        self.workdir.clone()
    }

    fn workdir_for(&self, folder_path: &str, task: &str) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/projects/show{}/work/{}", folder_path, task)))
    }
}

#[derive(Default)]
pub struct MemoryCreationContext {
    pub instances: Mutex<Vec<Instance>>,
    pub saves: Mutex<Vec<Vec<Instance>>>,
}

impl CreationContext for MemoryCreationContext {
    fn instances(&self) -> Vec<Instance> {
        lock(&self.instances).clone()
    }

    fn save_changes(&self, instances: &[Instance]) -> Result<(), CreateError> {
        lock(&self.saves).push(instances.to_vec());
        *lock(&self.instances) = instances.to_vec();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPrompter {
    pub repairs: Mutex<Vec<RepairRequest>>,
    pub reset_answer: Mutex<Option<ResetOptions>>,
    pub reset_prompts: AtomicUsize,
    pub outdated_shown: AtomicUsize,
}

impl RecordingPrompter {
    pub fn answering(options: Option<ResetOptions>) -> Arc<Self> {
        let p = Self::default();
        *lock(&p.reset_answer) = options;
        Arc::new(p)
    }

    pub fn repair_count(&self) -> usize {
        lock(&self.repairs).len()
    }

    pub fn take_repairs(&self) -> Vec<RepairRequest> {
        std::mem::take(&mut *lock(&self.repairs))
    }
}

impl Prompter for RecordingPrompter {
    fn prompt_repair(&self, request: RepairRequest) {
        lock(&self.repairs).push(request);
    }

    fn prompt_reset_context(&self) -> Option<ResetOptions> {
        self.reset_prompts.fetch_add(1, Ordering::SeqCst);
        *lock(&self.reset_answer)
    }

    fn show_outdated_containers(&self) {
        self.outdated_shown.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixedInventory(pub bool);

impl Inventory for FixedInventory {
    fn any_outdated(&self, _containers: &[Container]) -> bool {
        self.0
    }
}
