pub mod plan_catalog;
pub mod signature;
