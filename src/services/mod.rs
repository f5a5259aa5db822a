pub mod archive;
pub mod inference;
pub mod job_store;
pub mod mosaic;
pub mod pipeline;
pub mod reaper;
pub mod registry;
pub mod worker;
