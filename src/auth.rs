use actix_web::{
    http::{header, StatusCode},
    web, HttpRequest, HttpResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::Session;
use crate::core::errors::AppError;
use crate::handlers::{html_response as html, AppState};
use crate::models::models::Credentials;
use crate::templates;

pub const USUARIO_REQUIRED: &str = "El correo electrónico o nombre de usuario es obligatorio";
pub const PASSWORD_REQUIRED: &str = "La contraseña es obligatoria";
pub const LOGIN_FAILED: &str = "Error al iniciar sesión";

#[derive(Deserialize, Debug, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub usuario: String,
    #[serde(default)]
    pub password: String,
    /// `toggle` when the eye button was pressed, `submit` otherwise.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub password_visible: Option<String>,
}

/// State of the login form as rendered.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoginView {
    pub usuario: String,
    pub password: String,
    pub password_visible: bool,
    pub usuario_error: Option<&'static str>,
    pub password_error: Option<&'static str>,
    pub general_error: Option<String>,
}

impl LoginView {
    fn from_form(form: &LoginForm) -> Self {
        Self {
            usuario: form.usuario.clone(),
            password: form.password.clone(),
            password_visible: matches!(form.password_visible.as_deref(), Some("1") | Some("true")),
            ..Self::default()
        }
    }

    /// Required-field checks run before anything is sent. Returns true when
    /// the form may be submitted.
    pub fn validate(&mut self) -> bool {
        self.usuario_error = self.usuario.is_empty().then_some(USUARIO_REQUIRED);
        self.password_error = self.password.is_empty().then_some(PASSWORD_REQUIRED);
        self.usuario_error.is_none() && self.password_error.is_none()
    }
}

/// Cookie header forwarded to the API on behalf of the browser.
pub fn session_from_request(req: &HttpRequest) -> Session {
    Session::new(
        req.headers()
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    )
}

/// Rewrites an API `Set-Cookie` so the browser stores it for this host: the
/// `Domain` attribute names the API host and is dropped.
pub fn relay_cookie(raw: &str) -> String {
    raw.split(';')
        .map(str::trim)
        .filter(|attr| !attr.is_empty())
        .filter(|attr| {
            !attr
                .split('=')
                .next()
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("domain"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// `GET /login`
pub async fn login_page() -> Result<HttpResponse, AppError> {
    Ok(html(StatusCode::OK, templates::render_login(&LoginView::default())?))
}

/// `POST /login`: password visibility toggle or credential submission.
pub async fn login_submit(
    state: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let mut view = LoginView::from_form(&form);

    if form.action.as_deref() == Some("toggle") {
        view.password_visible = !view.password_visible;
        return Ok(html(StatusCode::OK, templates::render_login(&view)?));
    }

    if !view.validate() {
        return Ok(html(
            StatusCode::UNPROCESSABLE_ENTITY,
            templates::render_login(&view)?,
        ));
    }

    let creds = Credentials {
        usuario: form.usuario,
        password: form.password,
    };

    match state.api.login(&creds).await {
        Ok(cookies) => {
            info!("Login succeeded for {}", creds.usuario);
            let mut resp = HttpResponse::SeeOther();
            resp.insert_header((header::LOCATION, state.config.home_path.as_str()));
            for cookie in &cookies {
                resp.append_header((header::SET_COOKIE, relay_cookie(cookie)));
            }
            Ok(resp.finish())
        }
        Err(err) => {
            warn!("Login failed for {}: {}", creds.usuario, err);
            view.general_error = Some(err.user_message(LOGIN_FAILED));
            let status = err
                .status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            Ok(html(status, templates::render_login(&view)?))
        }
    }
}
