pub mod maintenance;
pub mod records;
pub mod report;
