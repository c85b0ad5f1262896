pub mod auth;
pub mod comments;
pub mod courses;
pub mod lessons;
pub mod status;
pub mod user;
pub mod workplaces;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(status::status_routes)
            .configure(auth::auth_routes)
            .configure(user::user_routes)
            .configure(workplaces::workplace_routes)
            .configure(courses::course_routes)
            .configure(lessons::lesson_routes)
            .configure(comments::comment_routes),
    );
}
