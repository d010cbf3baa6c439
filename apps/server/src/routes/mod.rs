use actix_web::web;

mod dashboard;
mod health;

/// Register every route of the dashboard API
pub fn routes(cfg: &mut web::ServiceConfig) {
    health::routes(cfg);
    cfg.service(web::scope("/api").configure(dashboard::routes));
}
