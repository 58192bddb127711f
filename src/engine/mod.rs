// Engine: download task lifecycle from submission to terminal notification.

pub mod fetch;
pub mod notifier;
pub mod registry;
pub mod store;
pub mod task;
pub mod worker;
