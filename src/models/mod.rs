pub mod comment;
pub mod course;
pub mod enrollment;
pub mod lesson;
pub mod lesson_progress;
pub mod material;
pub mod user;
pub mod user_token;
pub mod workplace;
