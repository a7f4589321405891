mod backup;
mod chat;
mod dashboard;
mod entry;
mod helpers;
mod settings;

pub(crate) use backup::{cmd_export, cmd_import};
pub(crate) use chat::cmd_chat;
pub(crate) use dashboard::{cmd_dashboard, cmd_intake};
pub(crate) use entry::{cmd_delete, cmd_list, cmd_log, cmd_trend};
pub(crate) use settings::{cmd_settings_set, cmd_settings_show};
