pub mod job;
pub mod modality;
pub mod progress;
