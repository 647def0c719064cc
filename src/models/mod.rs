pub mod job;
pub mod record;
