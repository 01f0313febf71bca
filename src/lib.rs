pub mod appsettings;
pub mod dispatch;
pub mod reminder;
pub mod scheduling;
pub mod storage;
