pub mod job_lifecycle;
