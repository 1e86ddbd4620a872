pub mod attachment;
pub mod contract;
pub mod job_definition;
pub mod skill;
pub mod user;
