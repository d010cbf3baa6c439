use actix_web::{HttpResponse, get};

macros_utils::routes! {
    route health_route,
}

/// Liveness probe for load balancers: an empty 200
#[get("/")]
pub async fn health_route() -> HttpResponse {
    HttpResponse::Ok().finish()
}
