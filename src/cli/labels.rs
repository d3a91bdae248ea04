//! Display text looked up by fixed keys.
//!
//! Page chrome, buttons and section titles are requested by key. Only an
//! English table ships. An unknown key renders as itself so a missing
//! translation is visible rather than blank.

pub const HOME: &str = "breadCrumb.home";
pub const TASKS: &str = "breadCrumb.tasks";
pub const BTN_STOP: &str = "btn.stop";
pub const BTN_CANCEL: &str = "btn.cancel";
pub const BTN_CONFIRM: &str = "btn.confirm";
pub const STOP_TASK: &str = "taskDetail.stopTask";
pub const STOP_TASK_TIPS: &str = "taskDetail.stopTaskTips";
pub const GENERAL_CONFIG: &str = "taskDetail.generalConfig";
pub const ENGINE: &str = "taskDetail.engine";
pub const SOURCE_TYPE: &str = "taskDetail.sourceType";
pub const REP_STATUS: &str = "taskDetail.repStatus";
pub const DETAILS: &str = "taskDetail.details";
pub const IMAGES: &str = "taskDetail.images";
pub const OPTION: &str = "taskDetail.option";
pub const TASK_ID: &str = "taskDetail.taskId";
pub const CREATED_AT: &str = "taskDetail.createdAt";
pub const DESCRIPTION: &str = "taskDetail.description";
pub const ALARM_EMAIL: &str = "taskDetail.alarmEmail";
pub const LOADING: &str = "common.loading";

pub fn label(key: &str) -> &str {
    match key {
        HOME => "Home",
        TASKS => "Tasks",
        BTN_STOP => "Stop",
        BTN_CANCEL => "Cancel",
        BTN_CONFIRM => "Confirm",
        STOP_TASK => "Stop Task",
        STOP_TASK_TIPS => "Are you sure you want to stop this task?",
        GENERAL_CONFIG => "General configuration",
        ENGINE => "Engine",
        SOURCE_TYPE => "Source type",
        REP_STATUS => "Replication status",
        DETAILS => "Details",
        IMAGES => "Images",
        OPTION => "Options",
        TASK_ID => "Task ID",
        CREATED_AT => "Created",
        DESCRIPTION => "Description",
        ALARM_EMAIL => "Alarm email",
        LOADING => "Loading...",
        other => other,
    }
}
