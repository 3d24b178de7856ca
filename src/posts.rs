use actix_multipart::Multipart;
use actix_web::{
    http::{header, StatusCode},
    web, HttpRequest, HttpResponse,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::api::{ApiClient, Session};
use crate::auth::session_from_request;
use crate::config::{MAX_IMAGE_BYTES, MAX_TITLE_LENGTH};
use crate::core::errors::AppError;
use crate::core::helpers::safe_local_path;
use crate::core::query_params::ViewFlags;
use crate::handlers::{html_response, see_other, AppState};
use crate::models::models::{ImageUpload, Post, PostUpdate, Review, User};
use crate::permissions::{can_edit_review, Permissions};
use crate::reviews::{ReviewForm, REVIEWS_LOAD_FAILED};
use crate::templates;

pub const LOAD_FAILED: &str = "Error al cargar la publicación";
pub const UPDATE_FAILED: &str = "Error al actualizar la publicación";
pub const DELETE_FAILED: &str = "Error al eliminar la publicación";
pub const VALIDATE_FAILED: &str = "Error al validar la publicación";
pub const TITLE_REQUIRED: &str = "El título es obligatorio";
pub const TITLE_TOO_LONG: &str = "El título es demasiado largo";
pub const IMAGE_TOO_LARGE: &str = "La imagen supera el tamaño máximo permitido";
pub const IMAGE_NOT_AN_IMAGE: &str = "El archivo debe ser una imagen";
pub const FIELD_TOO_LARGE: &str = "El contenido supera el tamaño máximo permitido";

pub fn post_path(post_id: &str) -> String {
    format!("/posts/{}", urlencoding::encode(post_id))
}

/// Reviews as far as the view knows them.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewList {
    /// Pending posts take no reviews and none are fetched.
    Hidden,
    Loaded(Vec<Review>),
    Failed(String),
}

impl ReviewList {
    pub fn as_slice(&self) -> &[Review] {
        match self {
            ReviewList::Loaded(reviews) => reviews,
            _ => &[],
        }
    }
}

/// Everything fetched for one render of the post view.
#[derive(Debug, Clone)]
pub struct PostContext {
    pub post: Post,
    pub user: Option<User>,
    pub reviews: ReviewList,
    pub perms: Permissions,
}

/// Fetches the post, the viewer and the reviews, in that order.
///
/// A 401 on the viewer lookup means nobody is logged in and yields an
/// anonymous context; any other failure aborts the view.
pub async fn load_context(
    api: &ApiClient,
    session: &Session,
    post_id: &str,
) -> Result<PostContext, AppError> {
    let post = api.get_post(session, post_id).await.map_err(|err| {
        if err.is_not_found() {
            AppError::PostNotFound
        } else {
            error!("Loading post {} failed: {}", post_id, err);
            AppError::upstream(LOAD_FAILED)
        }
    })?;

    let user = match api.current_user(session).await {
        Ok(user) => Some(user),
        Err(err) if err.is_unauthorized() => None,
        Err(err) => {
            error!("Loading current user failed: {}", err);
            return Err(AppError::upstream(LOAD_FAILED));
        }
    };

    let reviews = if post.validated {
        match api.list_reviews(session, post_id).await {
            Ok(reviews) => ReviewList::Loaded(reviews),
            Err(err) => {
                warn!("Loading reviews of post {} failed: {}", post_id, err);
                ReviewList::Failed(REVIEWS_LOAD_FAILED.to_string())
            }
        }
    } else {
        ReviewList::Hidden
    };

    let perms = Permissions::compute(user.as_ref(), &post, reviews.as_slice());

    Ok(PostContext {
        post,
        user,
        reviews,
        perms,
    })
}

/// Contents of the post edit form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    pub error: Option<&'static str>,
}

impl PostDraft {
    fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            body: post.body.clone(),
            error: None,
        }
    }
}

/// One render of the single post view.
pub struct PostPage<'a> {
    pub ctx: &'a PostContext,
    pub api_base: &'a str,
    pub back: Option<String>,
    /// `Some` renders the edit form instead of the post.
    pub post_draft: Option<PostDraft>,
    pub review_form: ReviewForm,
    pub review_edit: Option<ReviewForm>,
}

impl<'a> PostPage<'a> {
    pub fn new(ctx: &'a PostContext, api_base: &'a str) -> Self {
        Self {
            ctx,
            api_base,
            back: None,
            post_draft: None,
            review_form: ReviewForm::default(),
            review_edit: None,
        }
    }
}

/// Where delete and validate return to: an explicit `back` parameter, else a
/// same-host referer other than this post, else the home page.
fn back_target(req: &HttpRequest, flags: &ViewFlags, post_id: &str) -> Option<String> {
    if let Some(back) = safe_local_path(flags.back.as_deref()) {
        return Some(back);
    }

    let referer = req.headers().get(header::REFERER)?.to_str().ok()?;
    let host = req.connection_info().host().to_string();
    let (_, rest) = referer.split_once("://")?;
    let path = safe_local_path(rest.strip_prefix(host.as_str()))?;

    let own = post_path(post_id);
    let is_own = path == own || path.starts_with(&format!("{own}?")) || path.starts_with(&format!("{own}/"));
    (!is_own).then_some(path)
}

#[derive(Deserialize, Debug, Default)]
pub struct BackForm {
    #[serde(default)]
    pub back: Option<String>,
}

fn back_or_home(state: &AppState, back: Option<&str>) -> String {
    safe_local_path(back).unwrap_or_else(|| state.config.home_path.clone())
}

/// `GET /posts/{id}`
pub async fn show_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let session = session_from_request(&req);
    let flags = ViewFlags::from_uri(&req.uri().to_string());

    let ctx = load_context(&state.api, &session, &post_id).await?;

    let mut page = PostPage::new(&ctx, state.api.base_url());
    page.back = back_target(&req, &flags, &post_id);
    if flags.editing_post && ctx.perms.can_edit {
        page.post_draft = Some(PostDraft::from_post(&ctx.post));
    }
    page.review_edit = flags.editing_review.as_deref().and_then(|review_id| {
        ctx.reviews
            .as_slice()
            .iter()
            .find(|r| r.id == review_id && can_edit_review(ctx.user.as_ref(), r))
            .map(ReviewForm::for_review)
    });

    Ok(html_response(StatusCode::OK, templates::render_post_page(&page)?))
}

/// Multipart body of the edit form.
#[derive(Debug, Default)]
struct PostForm {
    title: String,
    body: String,
    image: Option<ImageUpload>,
    image_too_large: bool,
    /// A text field went over the upload cap and was cut short.
    text_too_large: bool,
}

impl PostForm {
    fn check(&self) -> Option<&'static str> {
        if self.text_too_large {
            return Some(FIELD_TOO_LARGE);
        }
        let title = self.title.trim();
        if title.is_empty() {
            return Some(TITLE_REQUIRED);
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Some(TITLE_TOO_LONG);
        }
        if self.image_too_large {
            return Some(IMAGE_TOO_LARGE);
        }
        if let Some(image) = &self.image {
            if !image.content_type.starts_with("image/") {
                return Some(IMAGE_NOT_AN_IMAGE);
            }
        }
        None
    }
}

async fn read_post_form(payload: &mut Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Formulario inválido: {e}")))?;

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field
            .content_type()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut bytes = Vec::new();
        let mut oversized = false;
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| AppError::BadRequest(format!("Formulario inválido: {e}")))?;
            // Drain the rest of the field once over the cap.
            if oversized || bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                oversized = true;
                continue;
            }
            bytes.extend_from_slice(&chunk);
        }

        if oversized && name != "image" {
            warn!("Multipart field {} exceeds {} bytes", name, MAX_IMAGE_BYTES);
            form.text_too_large = true;
        }

        match name.as_str() {
            "title" => form.title = String::from_utf8_lossy(&bytes).into_owned(),
            "body" => form.body = String::from_utf8_lossy(&bytes).into_owned(),
            "image" => {
                // An empty file input still sends a part, with no file name.
                let file_name = file_name.filter(|n| !n.is_empty());
                if oversized {
                    form.image_too_large = true;
                } else if let Some(file_name) = file_name {
                    if !bytes.is_empty() {
                        form.image = Some(ImageUpload {
                            file_name,
                            content_type,
                            bytes,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// `POST /posts/{id}`: saves the edit form.
pub async fn save_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let session = session_from_request(&req);
    let form = read_post_form(&mut payload).await?;

    if let Some(problem) = form.check() {
        let ctx = load_context(&state.api, &session, &post_id).await?;
        let mut page = PostPage::new(&ctx, state.api.base_url());
        page.post_draft = Some(PostDraft {
            title: form.title,
            body: form.body,
            error: Some(problem),
        });
        return Ok(html_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            templates::render_post_page(&page)?,
        ));
    }

    let update = PostUpdate {
        title: form.title.trim().to_string(),
        body: form.body,
        image: form.image,
    };
    let with_image = update.image.is_some();

    if let Err(err) = state.api.update_post(&session, &post_id, update).await {
        error!("Updating post {} failed: {}", post_id, err);
        return Err(AppError::upstream(UPDATE_FAILED));
    }

    info!("Post {} updated (new image: {})", post_id, with_image);
    Ok(see_other(&post_path(&post_id)))
}

/// `GET /posts/{id}/delete`: confirmation step.
pub async fn confirm_delete_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let session = session_from_request(&req);
    let flags = ViewFlags::from_uri(&req.uri().to_string());

    let post = state.api.get_post(&session, &post_id).await.map_err(|err| {
        if err.is_not_found() {
            AppError::PostNotFound
        } else {
            error!("Loading post {} failed: {}", post_id, err);
            AppError::upstream(LOAD_FAILED)
        }
    })?;

    let back = safe_local_path(flags.back.as_deref());
    Ok(html_response(
        StatusCode::OK,
        templates::render_confirm_delete(&post, back.as_deref())?,
    ))
}

/// `POST /posts/{id}/delete`
pub async fn delete_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<BackForm>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let session = session_from_request(&req);

    let is_admin = match state.api.current_user(&session).await {
        Ok(user) => user.is_admin,
        Err(err) => {
            warn!("Could not resolve current user before delete: {}", err);
            false
        }
    };

    if let Err(err) = state.api.delete_post(&session, &post_id, is_admin).await {
        error!("Deleting post {} failed: {}", post_id, err);
        return Err(AppError::Upstream {
            message: DELETE_FAILED.to_string(),
            details: Some(err.detail()),
        });
    }

    info!("Post {} deleted (as admin: {})", post_id, is_admin);
    Ok(see_other(&back_or_home(&state, form.back.as_deref())))
}

/// `POST /posts/{id}/validate`
pub async fn validate_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<BackForm>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let session = session_from_request(&req);

    if let Err(err) = state.api.validate_post(&session, &post_id).await {
        error!("Validating post {} failed: {}", post_id, err);
        return Err(AppError::upstream(VALIDATE_FAILED));
    }

    info!("Post {} validated", post_id);
    Ok(see_other(&back_or_home(&state, form.back.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn form(title: &str) -> PostForm {
        PostForm {
            title: title.to_string(),
            body: "cuerpo".to_string(),
            ..PostForm::default()
        }
    }

    #[test]
    fn test_post_form_checks() {
        assert_eq!(form("Título").check(), None);
        assert_eq!(form("  ").check(), Some(TITLE_REQUIRED));
        assert_eq!(form(&"x".repeat(MAX_TITLE_LENGTH + 1)).check(), Some(TITLE_TOO_LONG));

        let mut oversized = form("Título");
        oversized.image_too_large = true;
        assert_eq!(oversized.check(), Some(IMAGE_TOO_LARGE));

        let mut truncated = form("");
        truncated.text_too_large = true;
        assert_eq!(truncated.check(), Some(FIELD_TOO_LARGE));

        let mut text_file = form("Título");
        text_file.image = Some(ImageUpload {
            file_name: "notas.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: b"hola".to_vec(),
        });
        assert_eq!(text_file.check(), Some(IMAGE_NOT_AN_IMAGE));
    }

    #[test]
    fn test_post_path_encodes_id() {
        assert_eq!(post_path("12"), "/posts/12");
        assert_eq!(post_path("a b/c"), "/posts/a%20b%2Fc");
    }

    #[test]
    fn test_back_target_prefers_explicit_parameter() {
        let req = TestRequest::get()
            .uri("/posts/5?back=/posts")
            .insert_header((header::HOST, "localhost:3000"))
            .insert_header((header::REFERER, "http://localhost:3000/home"))
            .to_http_request();
        let flags = ViewFlags::from_uri(&req.uri().to_string());
        assert_eq!(back_target(&req, &flags, "5").as_deref(), Some("/posts"));
    }

    #[test]
    fn test_back_target_uses_same_host_referer() {
        let req = TestRequest::get()
            .uri("/posts/5")
            .insert_header((header::HOST, "localhost:3000"))
            .insert_header((header::REFERER, "http://localhost:3000/home?page=2"))
            .to_http_request();
        assert_eq!(
            back_target(&req, &ViewFlags::default(), "5").as_deref(),
            Some("/home?page=2")
        );

        let foreign = TestRequest::get()
            .uri("/posts/5")
            .insert_header((header::HOST, "localhost:3000"))
            .insert_header((header::REFERER, "http://evil.example/home"))
            .to_http_request();
        assert_eq!(back_target(&foreign, &ViewFlags::default(), "5"), None);

        let itself = TestRequest::get()
            .uri("/posts/5")
            .insert_header((header::HOST, "localhost:3000"))
            .insert_header((header::REFERER, "http://localhost:3000/posts/5?edit=1"))
            .to_http_request();
        assert_eq!(back_target(&itself, &ViewFlags::default(), "5"), None);
    }
}
