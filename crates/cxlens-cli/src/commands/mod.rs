pub mod analyze;
pub mod report;
pub mod serve;
pub mod validate;
