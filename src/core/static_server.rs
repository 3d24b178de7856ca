use actix_web::{web, HttpResponse};
use mime_guess::from_path;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

/// `GET /static/{path}`: stylesheet and other embedded assets.
pub async fn serve_static(path: web::Path<String>) -> HttpResponse {
    let file_path = path.into_inner();

    match Assets::get(&file_path) {
        Some(file) => {
            let mime = from_path(&file_path).first_or_octet_stream();
            HttpResponse::Ok()
                .content_type(mime.as_ref())
                .body(file.data.into_owned())
        }
        None => HttpResponse::NotFound().body("Not found"),
    }
}
