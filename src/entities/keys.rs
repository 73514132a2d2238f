//! Host attribute, preference and metadata key constants.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `comp.get_attrs().get_i64(COMPN_GLOBAL_START)`

// === Comp attributes ===
pub const COMPN_GLOBAL_START: &str = "COMPN_GlobalStart";
pub const COMPN_GLOBAL_END: &str = "COMPN_GlobalEnd";
pub const COMPN_RENDER_START: &str = "COMPN_RenderStart";
pub const COMPN_RENDER_END: &str = "COMPN_RenderEnd";
/// Unsaved-changes flag
pub const COMPB_MODIFIED: &str = "COMPB_Modified";
/// Current comp file path; empty when never saved
pub const COMPS_FILE_NAME: &str = "COMPS_FileName";

// === Tool attributes ===
pub const TOOLB_PASS_THROUGH: &str = "TOOLB_PassThrough";
pub const TOOLS_NAME: &str = "TOOLS_Name";
pub const TOOLB_NAME_SET: &str = "TOOLB_NameSet";
/// Clip length table on Loader tools, index 1 holds the frame count
pub const TOOLIT_CLIP_LENGTH: &str = "TOOLIT_Clip_Length";

// === Frame format preferences ===
pub const PREFS_FRAME_FORMAT: &str = "Comp.FrameFormat";
pub const PREF_RATE: &str = "Rate";
pub const PREF_WIDTH: &str = "Width";
pub const PREF_HEIGHT: &str = "Height";
pub const PREF_ASPECT_X: &str = "AspectX";
pub const PREF_ASPECT_Y: &str = "AspectY";

/// Full preference key, e.g. `Comp.FrameFormat.Rate`.
pub fn frame_format_key(key: &str) -> String {
    format!("{}.{}", PREFS_FRAME_FORMAT, key)
}

// === Tool types and inputs ===
pub const TOOL_SAVER: &str = "Saver";
pub const TOOL_LOADER: &str = "Loader";
pub const INPUT_CLIP: &str = "Clip";
pub const INPUT_COMMENTS: &str = "Comments";
pub const INPUT_GLOBAL_IN: &str = "GlobalIn";
pub const INPUT_GLOBAL_OUT: &str = "GlobalOut";
pub const INPUT_CLIP_TIME_START: &str = "ClipTimeStart";
pub const INPUT_CLIP_TIME_END: &str = "ClipTimeEnd";
pub const INPUT_HOLD_FIRST_FRAME: &str = "HoldFirstFrame";
pub const INPUT_HOLD_LAST_FRAME: &str = "HoldLastFrame";

// === Metadata namespaces ===
/// Container (loaded asset) metadata namespace
pub const NS_AVALON: &str = "avalon";
/// Publish instance and comp context namespace
pub const NS_OPENPYPE: &str = "openpype";

pub const CONTAINER_SCHEMA: &str = "openpype:container-2.0";
/// Fixed sentinel stored under `avalon.id` on every container
pub const AVALON_CONTAINER_ID: &str = "pyblish.avalon.container";
pub const AYON_INSTANCE_ID: &str = "ayon.create.instance";
pub const AVALON_INSTANCE_ID: &str = "pyblish.avalon.instance";

// === Host notifications ===
pub const ACTION_COMP_SAVE: &str = "Comp_Save";
pub const ACTION_COMP_SAVE_AS: &str = "Comp_SaveAs";
pub const ACTION_COMP_NEW: &str = "Comp_New";
pub const ACTION_COMP_OPENED: &str = "Comp_Opened";

/// Notification kinds the bridge subscribes to on install.
pub const ACTION_IDS: [&str; 4] = [
    ACTION_COMP_SAVE,
    ACTION_COMP_SAVE_AS,
    ACTION_COMP_NEW,
    ACTION_COMP_OPENED,
];
