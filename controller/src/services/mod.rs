pub mod kind_detection;
pub mod paths;
pub mod port_pool;
pub mod template_catalog;
pub mod watchdog;
pub mod zip_extract;
