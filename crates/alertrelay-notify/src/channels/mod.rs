pub mod dingtalk;
pub mod email;
pub mod feishu;
pub mod phone;
pub(crate) mod robot;
pub mod webhook;
pub mod wecom;
