use super::handlers::{auth, feedback, health, reset_password, roles, stats, users};
use super::middleware::require_access_token;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Routes under `protected` only run after `require_access_token` resolved a
/// principal; everything else is reachable anonymously.
pub(crate) fn api_router() -> OpenApiRouter {
    let protected = OpenApiRouter::new()
        .routes(routes!(auth::logout))
        .routes(routes!(users::list_users, users::create_user))
        .routes(routes!(users::user_exists))
        .routes(routes!(users::get_user, users::update_user, users::delete_user))
        .routes(routes!(users::add_role, users::remove_role))
        .routes(routes!(users::get_roles))
        .routes(routes!(users::get_permissions))
        .routes(routes!(roles::list_roles, roles::create_role))
        .routes(routes!(roles::role_exists))
        .routes(routes!(roles::get_role_by_name))
        .routes(routes!(roles::get_role, roles::update_role, roles::delete_role))
        .routes(routes!(feedback::create_feedback, feedback::list_feedback))
        .routes(routes!(feedback::list_user_feedback))
        .routes(routes!(feedback::update_feedback_status))
        .routes(routes!(stats::get_stats))
        .routes(routes!(stats::increment_counter))
        .route_layer(axum::middleware::from_fn(require_access_token));

    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login))
        .routes(routes!(auth::sign_up))
        .routes(routes!(auth::current_user))
        .routes(routes!(auth::refresh_token))
        .routes(routes!(auth::oauth_login))
        .routes(routes!(reset_password::send_email))
        .routes(routes!(reset_password::verify_code))
        .routes(routes!(reset_password::reset))
        .merge(protected);

    let openapi = router.get_openapi_mut();
    openapi.tags = Some(vec![
        tag("health", "Liveness and store reachability"),
        tag("auth", "Login, signup, token refresh and external sign-in"),
        tag("users", "User management and role assignment"),
        tag("roles", "Role management"),
        tag("reset-password", "Emailed one-time code password reset"),
        tag("feedback", "User feedback intake"),
        tag("stats", "Per-user activity statistics"),
    ]);
    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => (
            non_empty(&author[..start]),
            non_empty(author[start + 1..].trim_end_matches('>')),
        ),
        None => (non_empty(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            doc.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Custodia"));
            assert_eq!(contact.email.as_deref(), Some("team@custodia.dev"));
        }

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let doc = openapi();
        let tags = doc.tags.clone().unwrap_or_default();
        for name in ["health", "auth", "users", "roles", "reset-password", "feedback", "stats"] {
            assert!(tags.iter().any(|tag| tag.name == name), "missing tag {name}");
        }
        for path in [
            "/health",
            "/auth/login",
            "/auth/signUp",
            "/auth/refreshToken",
            "/auth/oauth/{provider}",
            "/users/{id}",
            "/users/{id}/stats/{counter}",
            "/roles/name/{name}",
            "/feedback/{id}/status",
            "/reset-password",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn bearer_scheme_registered() {
        let doc = openapi();
        let schemes = doc
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }

    #[test]
    fn author_parsing() {
        assert_eq!(parse_author("Ann <a@x>"), (Some("Ann"), Some("a@x")));
        assert_eq!(parse_author("<a@x>"), (None, Some("a@x")));
        assert_eq!(parse_author("Ann"), (Some("Ann"), None));
    }
}
