//! Registration, login, logout and the profile page.

use std::str::FromStr;

use http::Method;

use bookshelf_auth::backends::{self, authenticate, Credentials, ModelBackend};
use bookshelf_auth::user::{prepare_user, update_profile};
use bookshelf_auth::{AuthBackend, AuthMethod, User};
use bookshelf_core::{BookshelfError, Settings};
use bookshelf_forms::{LoginForm, UserChangeForm, UserCreationForm};
use bookshelf_http::cookies::{Cookie, SameSite};
use bookshelf_http::{HttpRequest, HttpResponse, HttpResponseRedirect};

use super::{base_context, insert_form, render, ViewResult};
use crate::middleware::auth::current_user;
use crate::state::AppState;
use crate::urls::reverse;

fn session_cookie(settings: &Settings, key: &str) -> Cookie {
    Cookie::new(&settings.session_cookie_name, key)
        .max_age(settings.session_cookie_age)
        .secure(settings.session_cookie_secure)
        .httponly(settings.session_cookie_httponly)
        .samesite(SameSite::from_str(&settings.session_cookie_samesite).unwrap_or(SameSite::Lax))
}

/// Opens a session for `user` and redirects to `location` with the
/// session cookie set.
async fn start_session(state: &AppState, user: &User, location: &str) -> ViewResult {
    let store = state.auth_store();
    let key = backends::login(
        store.as_ref(),
        &state.settings.secret_key,
        user,
        state.settings.session_cookie_age,
    )
    .await?;
    let mut response = HttpResponseRedirect::new(location);
    response.set_cookie(&session_cookie(&state.settings, &key));
    Ok(response)
}

/// Returns `next` if it is a path on this site.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn render_registration(state: &AppState, request: &HttpRequest, form: &UserCreationForm) -> ViewResult {
    let mut context = base_context(request);
    insert_form(&mut context, form.form());
    render(state, "users/register.html", &context)
}

/// Copies validation errors raised outside the form onto it.
fn add_validation_errors(
    errors: &bookshelf_core::ValidationError,
    mut add: impl FnMut(Option<&str>, String),
) {
    for (field, messages) in &errors.field_errors {
        for message in messages {
            add(Some(field.as_str()), message.clone());
        }
    }
    for message in &errors.non_field_errors {
        add(None, message.clone());
    }
}

/// Sign-up. A valid submission creates the user, logs them in and
/// redirects home.
pub async fn register(state: AppState, request: HttpRequest) -> ViewResult {
    let mut form = UserCreationForm::new(state.settings.password_min_length);
    if request.method() != Method::POST {
        return render_registration(&state, &request, &form);
    }

    form.bind(request.post());
    let Some(new_user) = form.is_valid().then(|| form.new_user()).flatten() else {
        return render_registration(&state, &request, &form);
    };

    let store = state.auth_store();
    if store.get_user_by_username(new_user.username.trim()).await?.is_some() {
        form.add_error(Some("username"), "A user with that username already exists.");
        return render_registration(&state, &request, &form);
    }

    let user = match prepare_user(new_user).await {
        Ok(user) => user,
        Err(BookshelfError::ValidationError(errors)) => {
            add_validation_errors(&errors, |field, message| form.add_error(field, message));
            return render_registration(&state, &request, &form);
        }
        Err(e) => return Err(e),
    };
    let user = match store.insert_user(&user).await {
        Ok(user) => user,
        Err(BookshelfError::IntegrityError(_)) => {
            form.add_error(Some("username"), "A user with that username already exists.");
            return render_registration(&state, &request, &form);
        }
        Err(e) => return Err(e),
    };
    tracing::info!(username = %user.username, user_id = user.id, "user registered");
    start_session(&state, &user, &reverse("home", &[])?).await
}

fn render_login(
    state: &AppState,
    request: &HttpRequest,
    form: &LoginForm,
    next: Option<&str>,
) -> ViewResult {
    let mut context = base_context(request);
    insert_form(&mut context, form.form());
    context.insert("next", next.unwrap_or(""));
    render(state, "users/login.html", &context)
}

/// Username and password login. Redirects to a local `next` or to
/// `login_redirect_url`.
pub async fn login(state: AppState, request: HttpRequest) -> ViewResult {
    let next = safe_next(request.post().get("next").or_else(|| request.get().get("next")))
        .map(str::to_string);
    let mut form = LoginForm::new();
    if request.method() != Method::POST {
        return render_login(&state, &request, &form, next.as_deref());
    }

    form.bind(request.post());
    if !form.is_valid() {
        return render_login(&state, &request, &form, next.as_deref());
    }

    let credentials = Credentials::new(form.username(), form.password());
    let backends: Vec<Box<dyn AuthBackend>> = vec![Box::new(ModelBackend::new(state.auth_store()))];
    let Some(user) = authenticate(&credentials, &backends).await? else {
        tracing::warn!(username = %form.username(), "failed login");
        form.reject();
        return render_login(&state, &request, &form, next.as_deref());
    };

    let location = next.unwrap_or_else(|| state.settings.login_redirect_url.clone());
    start_session(&state, &user, &location).await
}

/// Ends the session and clears its cookie.
pub async fn logout(state: AppState, request: HttpRequest) -> ViewResult {
    if let Some(AuthMethod::Session(key)) = current_user(&request).map(|u| &u.method) {
        backends::logout(state.auth_store().as_ref(), &state.settings.secret_key, key).await?;
        tracing::info!("user logged out");
    }
    let mut response: HttpResponse = HttpResponseRedirect::new(&state.settings.logout_redirect_url);
    response.delete_cookie(&state.settings.session_cookie_name);
    Ok(response)
}

fn render_profile(
    state: &AppState,
    request: &HttpRequest,
    form: &UserChangeForm,
    user: &User,
) -> ViewResult {
    let mut context = base_context(request);
    insert_form(&mut context, form.form());
    context.insert("profile_photo", &user.profile_photo);
    render(state, "users/profile.html", &context)
}

/// Shows and saves the signed-in user's profile. A valid submission
/// redirects back to the page.
pub async fn profile(state: AppState, request: HttpRequest) -> ViewResult {
    let user = current_user(&request)
        .map(|u| u.user.clone())
        .ok_or_else(|| BookshelfError::PermissionDenied("Log in to edit your profile.".into()))?;
    if request.method() != Method::POST {
        return render_profile(&state, &request, &UserChangeForm::for_user(&user), &user);
    }

    let mut form = UserChangeForm::new();
    form.bind(request.post());
    let Some(update) = form.is_valid().then(|| form.profile_update()).flatten() else {
        return render_profile(&state, &request, &form, &user);
    };
    let changed = match update_profile(&user, update) {
        Ok(changed) => changed,
        Err(BookshelfError::ValidationError(errors)) => {
            add_validation_errors(&errors, |field, message| form.add_error(field, message));
            return render_profile(&state, &request, &form, &user);
        }
        Err(e) => return Err(e),
    };
    let saved = state.auth_store().update_user(&changed).await?;
    tracing::info!(username = %saved.username, user_id = saved.id, "profile updated");
    Ok(HttpResponseRedirect::new(&reverse("profile", &[])?))
}
