pub mod course_service;
pub mod progress_service;
pub mod session_service;
