//! HTML rendering.
//!
//! Page templates live in `static/templates` and are embedded at build time.
//! Placeholders are written `{{NAME}}` and substituted in a single pass, so a
//! value that happens to contain a placeholder is never expanded. Values are
//! escaped by the caller before substitution.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use rust_embed::RustEmbed;

use crate::auth::LoginView;
use crate::config::{MAX_RATING, MIN_RATING};
use crate::core::helpers::{
    average_rating, escape, escape_attr, format_date, image_url, render_body, stars,
};
use crate::models::models::{Post, Review};
use crate::permissions::{can_delete_review, can_edit_review};
use crate::posts::{post_path, PostDraft, PostPage, ReviewList};
use crate::reviews::{ReviewForm, ALREADY_REVIEWED};

#[derive(RustEmbed)]
#[folder = "static/templates"]
struct Templates;

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("Regex should compile"))
}

fn load(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name).ok_or_else(|| anyhow::anyhow!("Template {name} not found"))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

/// Substitutes `{{NAME}}` placeholders; unknown names render empty.
pub fn fill(template: &str, values: &[(&str, String)]) -> String {
    let values: HashMap<&str, &str> = values.iter().map(|(k, v)| (*k, v.as_str())).collect();
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| {
            values.get(&caps[1]).copied().unwrap_or_default().to_string()
        })
        .into_owned()
}

fn page(title: &str, body_class: &str, template: &str, values: &[(&str, String)]) -> anyhow::Result<String> {
    let content = fill(&load(template)?, values);
    Ok(fill(
        &load("layout.html")?,
        &[
            ("TITLE", escape(title)),
            ("BODY_CLASS", body_class.to_string()),
            ("CONTENT", content),
        ],
    ))
}

fn error_line(message: &str) -> String {
    format!(r#"<div class="error-message">{}</div>"#, escape(message))
}

/// Message page used for load and mutation failures. Falls back to a bare
/// page if the templates cannot be read.
pub fn render_message(message: &str, details: Option<&str>) -> String {
    let details = details
        .map(|d| format!("<p>Details: {}</p>", escape(d)))
        .unwrap_or_default();
    page(
        "Error",
        "post",
        "message.html",
        &[("MESSAGE", escape(message)), ("DETAILS", details.clone())],
    )
    .unwrap_or_else(|_| format!("<p>{}</p>{}", escape(message), details))
}

pub fn render_not_found() -> String {
    page("Publicación no encontrada", "post", "not_found.html", &[])
        .unwrap_or_else(|_| "<h1>Publicación no encontrada</h1>".to_string())
}

pub fn render_login(view: &LoginView) -> anyhow::Result<String> {
    let (password_type, toggle_icon, toggle_label) = if view.password_visible {
        ("text", "🙈", "Ocultar contraseña")
    } else {
        ("password", "👁", "Mostrar contraseña")
    };

    page(
        "Iniciar sesión",
        "login",
        "login.html",
        &[
            ("GENERAL_ERROR", view.general_error.as_deref().map(error_line).unwrap_or_default()),
            ("USUARIO_VALUE", escape_attr(&view.usuario)),
            ("USUARIO_ERROR", view.usuario_error.map(error_line).unwrap_or_default()),
            ("PASSWORD_TYPE", password_type.to_string()),
            ("PASSWORD_VALUE", escape_attr(&view.password)),
            ("PASSWORD_ERROR", view.password_error.map(error_line).unwrap_or_default()),
            ("PASSWORD_VISIBLE", if view.password_visible { "1" } else { "0" }.to_string()),
            ("TOGGLE_LABEL", toggle_label.to_string()),
            ("TOGGLE_ICON", toggle_icon.to_string()),
        ],
    )
}

pub fn render_confirm_delete(post: &Post, back: Option<&str>) -> anyhow::Result<String> {
    page(
        "Eliminar publicación",
        "post",
        "confirm.html",
        &[
            ("POST_TITLE", escape(&post.title)),
            ("POST_ID", escape_attr(&urlencoding::encode(&post.id))),
            ("BACK", escape_attr(back.unwrap_or_default())),
        ],
    )
}

pub fn render_post_page(view: &PostPage<'_>) -> anyhow::Result<String> {
    let post_html = match &view.post_draft {
        Some(draft) => edit_form(&view.ctx.post, draft),
        None => post_details(view),
    };

    page(
        &view.ctx.post.title,
        "post",
        "post.html",
        &[("POST", post_html), ("REVIEWS", reviews_section(view))],
    )
}

fn author_name(post: &Post) -> String {
    if post.user_is_admin {
        format!(r#"<span class="admin-name">{} (admin)</span>"#, escape(&post.user_name))
    } else {
        escape(&post.user_name)
    }
}

fn back_field(back: Option<&str>) -> String {
    back.map(|b| format!(r#"<input type="hidden" name="back" value="{}">"#, escape_attr(b)))
        .unwrap_or_default()
}

fn post_details(view: &PostPage<'_>) -> String {
    let post = &view.ctx.post;
    let perms = &view.ctx.perms;
    let path = escape_attr(&post_path(&post.id));
    let mut html = String::new();

    html.push_str(&format!(r#"<h1 class="post-title">{}</h1>"#, escape(&post.title)));
    html.push_str(&format!(
        r#"<div class="post-meta">Por {} • {}</div>"#,
        author_name(post),
        escape(&format_date(&post.created_at))
    ));
    if !post.validated {
        html.push_str(r#"<div class="pending">Pendiente de validación</div>"#);
    }
    if let Some(image) = post.image.as_deref().filter(|i| !i.is_empty()) {
        html.push_str(&format!(
            r#"<img class="post-image" src="{}" alt="Imagen de la publicación">"#,
            escape_attr(&image_url(view.api_base, image))
        ));
    }
    html.push_str(&format!(r#"<div class="post-body">{}</div>"#, render_body(&post.body)));

    html.push_str(r#"<div class="post-actions">"#);
    if perms.can_edit {
        html.push_str(&format!(r#"<a class="button edit" href="{path}?edit=1">Editar</a>"#));
    }
    if perms.can_validate {
        html.push_str(&format!(
            r#"<form method="post" action="{path}/validate">{}<button type="submit" class="button validate">Validar</button></form>"#,
            back_field(view.back.as_deref())
        ));
    }
    if perms.can_delete {
        let query = view
            .back
            .as_deref()
            .map(|b| format!("?back={}", urlencoding::encode(b)))
            .unwrap_or_default();
        html.push_str(&format!(
            r#"<a class="button delete" href="{path}/delete{}">Eliminar</a>"#,
            escape_attr(&query)
        ));
    }
    html.push_str("</div>");

    html
}

fn edit_form(post: &Post, draft: &PostDraft) -> String {
    let path = escape_attr(&post_path(&post.id));
    let error = draft.error.map(error_line).unwrap_or_default();

    format!(
        r#"<form class="edit-form" method="post" action="{path}" enctype="multipart/form-data">
    {error}
    <input type="text" name="title" value="{}">
    <textarea name="body">{}</textarea>
    <input type="file" name="image" accept="image/*">
    <div>
      <button type="submit" class="button edit">Guardar</button>
      <a class="button" href="{path}">Cancelar</a>
    </div>
  </form>"#,
        escape_attr(&draft.title),
        escape(&draft.body),
    )
}

fn rating_options(selected: &str) -> String {
    (MIN_RATING..=MAX_RATING)
        .map(|r| {
            let value = r.to_string();
            let mark = if value == selected.trim() { " selected" } else { "" };
            format!(r#"<option value="{value}"{mark}>{}</option>"#, stars(r))
        })
        .collect()
}

fn review_form(action: &str, form: &ReviewForm, hidden_post_id: Option<&str>, cancel: Option<&str>) -> String {
    let errors: String = form.errors.iter().map(|e| error_line(e)).collect();
    let hidden = hidden_post_id
        .map(|id| format!(r#"<input type="hidden" name="post_id" value="{}">"#, escape_attr(id)))
        .unwrap_or_default();
    let cancel = cancel
        .map(|href| format!(r#"<a class="button" href="{}">Cancelar</a>"#, escape_attr(href)))
        .unwrap_or_default();

    format!(
        r#"<form class="review-form" method="post" action="{}">
    {errors}
    {hidden}
    <select name="rating"><option value="">Puntuación</option>{}</select>
    <textarea name="comment" placeholder="Escribe tu reseña">{}</textarea>
    <div><button type="submit" class="button edit">{}</button>{cancel}</div>
  </form>"#,
        escape_attr(action),
        rating_options(&form.rating),
        escape(&form.comment),
        if form.target.is_some() { "Guardar" } else { "Enviar reseña" },
    )
}

fn review_item(view: &PostPage<'_>, review: &Review) -> String {
    let user = view.ctx.user.as_ref();
    let post_id = &view.ctx.post.id;

    if let Some(edit) = view.review_edit.as_ref().filter(|e| e.target.as_deref() == Some(review.id.as_str())) {
        let action = format!("/reviews/{}", urlencoding::encode(&review.id));
        return format!(
            r#"<div class="review">{}</div>"#,
            review_form(&action, edit, Some(post_id.as_str()), Some(post_path(post_id).as_str()))
        );
    }

    let mut actions = String::new();
    if can_edit_review(user, review) {
        actions.push_str(&format!(
            r#"<a class="button edit" href="{}?review={}">Editar</a>"#,
            escape_attr(&post_path(post_id)),
            escape_attr(&urlencoding::encode(&review.id))
        ));
    }
    if can_delete_review(user, review) {
        actions.push_str(&format!(
            r#"<form method="post" action="/reviews/{}/delete"><input type="hidden" name="post_id" value="{}"><button type="submit" class="button delete">Eliminar</button></form>"#,
            escape_attr(&urlencoding::encode(&review.id)),
            escape_attr(post_id)
        ));
    }

    format!(
        r#"<div class="review">
    <div class="post-meta"><span class="stars">{}</span> {} • {}</div>
    <p class="review-comment">{}</p>
    <div class="post-actions">{actions}</div>
  </div>"#,
        stars(review.rating),
        escape(review.user_name.as_deref().unwrap_or("Usuario")),
        escape(&format_date(&review.created_at)),
        escape(&review.comment),
    )
}

fn reviews_section(view: &PostPage<'_>) -> String {
    // Reviews belong to the read view of validated posts only.
    if view.post_draft.is_some() {
        return String::new();
    }

    let body = match &view.ctx.reviews {
        ReviewList::Hidden => return String::new(),
        ReviewList::Failed(message) => error_line(message),
        ReviewList::Loaded(reviews) => {
            let mut html = String::new();
            let ratings: Vec<u8> = reviews.iter().map(|r| r.rating).collect();
            if let Some(avg) = average_rating(&ratings) {
                html.push_str(&format!(
                    r#"<div class="post-meta">Valoración media: {avg:.1} / {MAX_RATING} ({} reseñas)</div>"#,
                    reviews.len()
                ));
            } else {
                html.push_str("<p>Todavía no hay reseñas.</p>");
            }
            for review in reviews {
                html.push_str(&review_item(view, review));
            }
            html
        }
    };

    let perms = &view.ctx.perms;
    let footer = if perms.can_review {
        let action = format!("{}/reviews", post_path(&view.ctx.post.id));
        review_form(&action, &view.review_form, None, None)
    } else if perms.has_user_reviewed {
        format!("<p>{}</p>", escape(ALREADY_REVIEWED))
    } else {
        String::new()
    };

    format!(
        r#"<section class="reviews">
    <h2>Reseñas</h2>
    {body}
    {footer}
  </section>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::models::User;
    use crate::permissions::Permissions;
    use crate::posts::PostContext;

    fn post(validated: bool) -> Post {
        Post {
            id: "7".to_string(),
            title: "Receta <b>rápida</b>".to_string(),
            body: "Texto".to_string(),
            image: Some("/uploads/7.png".to_string()),
            user_id: "1".to_string(),
            user_name: "ana".to_string(),
            user_is_admin: true,
            validated,
            created_at: "2024-05-01T10:00:00Z".to_string(),
        }
    }

    fn context(user: Option<User>, validated: bool, reviews: Vec<Review>) -> PostContext {
        let post = post(validated);
        let list = if validated { ReviewList::Loaded(reviews) } else { ReviewList::Hidden };
        let perms = Permissions::compute(user.as_ref(), &post, list.as_slice());
        PostContext {
            post,
            user,
            reviews: list,
            perms,
        }
    }

    fn owner() -> User {
        User {
            id: "1".to_string(),
            name: "ana".to_string(),
            is_admin: false,
        }
    }

    #[test]
    fn test_fill_is_single_pass() {
        let out = fill("<p>{{A}}</p><p>{{B}}</p>{{MISSING}}", &[("A", "{{B}}".to_string()), ("B", "x".to_string())]);
        assert_eq!(out, "<p>{{B}}</p><p>x</p>");
    }

    #[test]
    fn test_login_render_shows_errors_and_toggles_type() {
        let view = LoginView {
            usuario: "\"ana\"".to_string(),
            password_visible: true,
            usuario_error: Some(crate::auth::USUARIO_REQUIRED),
            ..LoginView::default()
        };
        let html = render_login(&view).unwrap();
        assert!(html.contains(r#"type="text" name="password""#));
        assert!(html.contains(crate::auth::USUARIO_REQUIRED));
        assert!(html.contains("&quot;ana&quot;"));
    }

    #[test]
    fn test_login_enter_key_submits_credentials() {
        let html = render_login(&LoginView::default()).unwrap();
        let first = html.find(r#"type="submit""#).unwrap();
        assert!(html[first..].starts_with(r#"type="submit" name="action" value="submit""#));
        assert!(html.contains(r#"value="toggle""#));
    }

    #[test]
    fn test_post_render_escapes_and_marks_admin_author() {
        let ctx = context(Some(owner()), false, vec![]);
        let page = PostPage::new(&ctx, "http://api.local");
        let html = render_post_page(&page).unwrap();

        assert!(html.contains("Receta &lt;b&gt;rápida&lt;/b&gt;"));
        assert!(html.contains(r#"<span class="admin-name">ana (admin)</span>"#));
        assert!(html.contains("Por "));
        assert!(html.contains("1/5/2024"));
        assert!(html.contains(r#"src="http://api.local/uploads/7.png""#));
        assert!(html.contains("Editar"));
        assert!(html.contains("Eliminar"));
        assert!(!html.contains("Validar"));
        assert!(!html.contains("Reseñas"));
    }

    #[test]
    fn test_edit_mode_replaces_post_body() {
        let ctx = context(Some(owner()), true, vec![]);
        let mut page = PostPage::new(&ctx, "http://api.local");
        page.post_draft = Some(PostDraft {
            title: "Nuevo".to_string(),
            body: "Cuerpo".to_string(),
            error: None,
        });
        let html = render_post_page(&page).unwrap();
        assert!(html.contains(r#"enctype="multipart/form-data""#));
        assert!(html.contains("Guardar"));
        assert!(html.contains("Cancelar"));
        assert!(!html.contains("Reseñas"));
    }

    #[test]
    fn test_reviewed_user_sees_notice_instead_of_form() {
        let review = Review {
            id: "r1".to_string(),
            post_id: "7".to_string(),
            user_id: "2".to_string(),
            user_name: Some("luis".to_string()),
            rating: 4,
            comment: "Rica".to_string(),
            created_at: "2024-05-02".to_string(),
        };
        let viewer = User {
            id: "2".to_string(),
            name: "luis".to_string(),
            is_admin: false,
        };
        let ctx = context(Some(viewer), true, vec![review]);
        let html = render_post_page(&PostPage::new(&ctx, "http://api.local")).unwrap();

        assert!(html.contains(ALREADY_REVIEWED));
        assert!(!html.contains("Enviar reseña"));
        assert!(html.contains("★★★★☆"));
        assert!(html.contains("Valoración media: 4.0"));
        assert!(html.contains("?review=r1"));
    }

    #[test]
    fn test_message_page_escapes_details() {
        let html = render_message("Error al eliminar la publicación", Some("<b>x</b>"));
        assert!(html.contains("Details: &lt;b&gt;x&lt;/b&gt;"));
    }
}
