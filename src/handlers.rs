use actix_web::{
    http::{header, StatusCode},
    web, HttpResponse,
};

use crate::api::ApiClient;
use crate::config::Config;
use crate::core::static_server::serve_static;
use crate::{auth, posts, reviews};

/// Shared by every handler through `web::Data`.
pub struct AppState {
    pub api: ApiClient,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            api: ApiClient::new(&config)?,
            config,
        })
    }
}

pub fn html_response(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .content_type("text/html; charset=utf-8")
        .body(body)
}

/// Redirect after a form post.
pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::get().to(auth::login_page))
        .route("/login", web::post().to(auth::login_submit))
        .route("/posts/{id}", web::get().to(posts::show_post))
        .route("/posts/{id}", web::post().to(posts::save_post))
        .route("/posts/{id}/delete", web::get().to(posts::confirm_delete_post))
        .route("/posts/{id}/delete", web::post().to(posts::delete_post))
        .route("/posts/{id}/validate", web::post().to(posts::validate_post))
        .route("/posts/{id}/reviews", web::post().to(reviews::create_review))
        .route("/reviews/{id}", web::post().to(reviews::update_review))
        .route("/reviews/{id}/delete", web::post().to(reviews::delete_review))
        .route("/static/{path:.*}", web::get().to(serve_static));
}
