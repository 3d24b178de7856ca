use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};

use crate::auth::session_from_request;
use crate::config::{MAX_COMMENT_LENGTH, MAX_RATING, MIN_RATING};
use crate::core::errors::AppError;
use crate::handlers::{html_response, see_other, AppState};
use crate::models::models::{Review, ReviewDraft};
use crate::posts::{load_context, post_path, PostPage};
use crate::templates;

pub const REVIEWS_LOAD_FAILED: &str = "Error al cargar las reseñas";
pub const CREATE_FAILED: &str = "Error al enviar la reseña";
pub const UPDATE_FAILED: &str = "Error al actualizar la reseña";
pub const DELETE_FAILED: &str = "Error al eliminar la reseña";
pub const RATING_OUT_OF_RANGE: &str = "La puntuación debe estar entre 1 y 5";
pub const COMMENT_REQUIRED: &str = "El comentario es obligatorio";
pub const COMMENT_TOO_LONG: &str = "El comentario es demasiado largo";
pub const ALREADY_REVIEWED: &str = "Ya has reseñado esta publicación";

/// Review form as submitted by the browser.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ReviewInput {
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub comment: String,
    /// Post the review belongs to; sent by the edit and delete forms.
    #[serde(default)]
    pub post_id: Option<String>,
}

impl ReviewInput {
    pub fn validate(&self) -> Result<ReviewDraft, Vec<&'static str>> {
        let mut errors = Vec::new();

        let rating = self
            .rating
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|r| (MIN_RATING..=MAX_RATING).contains(r));
        if rating.is_none() {
            errors.push(RATING_OUT_OF_RANGE);
        }

        let comment = self.comment.trim();
        if comment.is_empty() {
            errors.push(COMMENT_REQUIRED);
        } else if comment.chars().count() > MAX_COMMENT_LENGTH {
            errors.push(COMMENT_TOO_LONG);
        }

        match rating {
            Some(rating) if errors.is_empty() => Ok(ReviewDraft {
                rating,
                comment: comment.to_string(),
            }),
            _ => Err(errors),
        }
    }
}

/// Review form as rendered: either the new-review form (`target == None`) or
/// the inline editor of an existing review.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReviewForm {
    pub target: Option<String>,
    pub rating: String,
    pub comment: String,
    pub errors: Vec<&'static str>,
}

impl ReviewForm {
    pub fn for_review(review: &Review) -> Self {
        Self {
            target: Some(review.id.clone()),
            rating: review.rating.to_string(),
            comment: review.comment.clone(),
            errors: Vec::new(),
        }
    }

    fn rejected(target: Option<String>, input: &ReviewInput, errors: Vec<&'static str>) -> Self {
        Self {
            target,
            rating: input.rating.clone(),
            comment: input.comment.clone(),
            errors,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct DeleteReviewForm {
    #[serde(default)]
    pub post_id: Option<String>,
}

fn required_post_id(post_id: Option<&String>) -> Result<&str, AppError> {
    post_id
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Falta la publicación de la reseña".to_string()))
}

/// `POST /posts/{id}/reviews`
pub async fn create_review(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<ReviewInput>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();
    let session = session_from_request(&req);
    let input = form.into_inner();

    let draft = match input.validate() {
        Ok(draft) => draft,
        Err(errors) => {
            let ctx = load_context(&state.api, &session, &post_id).await?;
            let mut page = PostPage::new(&ctx, state.api.base_url());
            page.review_form = ReviewForm::rejected(None, &input, errors);
            return Ok(html_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                templates::render_post_page(&page)?,
            ));
        }
    };

    if let Err(err) = state.api.create_review(&session, &post_id, &draft).await {
        error!("Creating review on post {} failed: {}", post_id, err);
        return Err(AppError::upstream(&err.user_message(CREATE_FAILED)));
    }

    info!("Review created on post {} (rating {})", post_id, draft.rating);
    Ok(see_other(&post_path(&post_id)))
}

/// `POST /reviews/{id}`
pub async fn update_review(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<ReviewInput>,
) -> Result<HttpResponse, AppError> {
    let review_id = path.into_inner();
    let session = session_from_request(&req);
    let input = form.into_inner();
    let post_id = required_post_id(input.post_id.as_ref())?.to_string();

    let draft = match input.validate() {
        Ok(draft) => draft,
        Err(errors) => {
            let ctx = load_context(&state.api, &session, &post_id).await?;
            let mut page = PostPage::new(&ctx, state.api.base_url());
            page.review_edit = Some(ReviewForm::rejected(Some(review_id), &input, errors));
            return Ok(html_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                templates::render_post_page(&page)?,
            ));
        }
    };

    if let Err(err) = state.api.update_review(&session, &review_id, &draft).await {
        error!("Updating review {} failed: {}", review_id, err);
        return Err(AppError::upstream(&err.user_message(UPDATE_FAILED)));
    }

    info!("Review {} updated", review_id);
    Ok(see_other(&post_path(&post_id)))
}

/// `POST /reviews/{id}/delete`
pub async fn delete_review(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    form: web::Form<DeleteReviewForm>,
) -> Result<HttpResponse, AppError> {
    let review_id = path.into_inner();
    let session = session_from_request(&req);
    let post_id = required_post_id(form.post_id.as_ref())?.to_string();

    if let Err(err) = state.api.delete_review(&session, &review_id).await {
        error!("Deleting review {} failed: {}", review_id, err);
        return Err(AppError::upstream(&err.user_message(DELETE_FAILED)));
    }

    info!("Review {} deleted", review_id);
    Ok(see_other(&post_path(&post_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rating: &str, comment: &str) -> ReviewInput {
        ReviewInput {
            rating: rating.to_string(),
            comment: comment.to_string(),
            post_id: None,
        }
    }

    #[test]
    fn test_valid_review_is_trimmed() {
        let draft = input(" 4 ", "  Muy buena  ").validate().unwrap();
        assert_eq!(draft.rating, 4);
        assert_eq!(draft.comment, "Muy buena");
    }

    #[test]
    fn test_rating_bounds() {
        for bad in ["0", "6", "-1", "tres", ""] {
            let errors = input(bad, "ok").validate().unwrap_err();
            assert_eq!(errors, vec![RATING_OUT_OF_RANGE], "rating {bad:?}");
        }
        assert!(input("1", "ok").validate().is_ok());
        assert!(input("5", "ok").validate().is_ok());
    }

    #[test]
    fn test_comment_rules() {
        assert_eq!(input("3", "   ").validate().unwrap_err(), vec![COMMENT_REQUIRED]);

        let long = "a".repeat(MAX_COMMENT_LENGTH + 1);
        assert_eq!(input("3", &long).validate().unwrap_err(), vec![COMMENT_TOO_LONG]);
    }

    #[test]
    fn test_all_errors_reported_together() {
        let errors = input("9", "").validate().unwrap_err();
        assert_eq!(errors, vec![RATING_OUT_OF_RANGE, COMMENT_REQUIRED]);
    }

    #[test]
    fn test_required_post_id() {
        assert!(required_post_id(None).is_err());
        assert!(required_post_id(Some(&"  ".to_string())).is_err());
        assert_eq!(required_post_id(Some(&"7".to_string())).unwrap(), "7");
    }
}
