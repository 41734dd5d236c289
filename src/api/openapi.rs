use super::handlers::{health, logout, otp, process, states};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that is served and also drives the `OpenAPI` document.
///
/// `/`, `OPTIONS /health` and the document itself are added in `api::app`
/// and stay undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(process::process))
        .routes(routes!(otp::form, otp::submit))
        .routes(routes!(states::claim))
        .routes(routes!(logout::logout));

    let mut host_tag = Tag::new("host");
    host_tag.description = Some("Calls made by the identity provider".to_string());

    let mut browser_tag = Tag::new("browser");
    browser_tag.description = Some("Pages the user's browser is sent to".to_string());

    router.get_openapi_mut().tags = Some(vec![host_tag, browser_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

/// First of the `;` separated cargo authors, as `Name <email>` or a bare name.
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = non_empty(authors.split(';').next()?)?;

    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (Some(primary), None),
    };

    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
