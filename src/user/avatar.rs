use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ServiceError;

pub const MAX_AVATAR_BYTES: usize = 1024 * 1024;

static DATA_URI: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^data:image/(png|jpg|jpeg);base64,([A-Za-z0-9+/]+={0,2})$"));

/// Accepts an `https://` URL or a png/jpeg base64 data URI no larger than 1 MiB.
///
/// # Errors
/// Returns `BadRequest` for anything else.
pub fn validate_avatar(avatar: &str) -> Result<(), ServiceError> {
    if let Some(rest) = avatar.strip_prefix("https://") {
        return match url::Url::parse(avatar) {
            Ok(parsed) if parsed.host_str().is_some() && !rest.is_empty() => Ok(()),
            _ => Err(invalid("avatar URL is malformed")),
        };
    }

    if avatar.len() > MAX_AVATAR_BYTES {
        return Err(invalid("avatar exceeds 1 MiB"));
    }
    let pattern = DATA_URI.as_ref().map_err(ServiceError::internal)?;
    let payload = pattern
        .captures(avatar)
        .and_then(|captures| captures.get(2))
        .ok_or_else(|| invalid("avatar must be an https URL or a png/jpeg data URI"))?;
    base64::engine::general_purpose::STANDARD
        .decode(payload.as_str())
        .map_err(|_| invalid("avatar data is not valid base64"))?;
    Ok(())
}

fn invalid(message: &str) -> ServiceError {
    ServiceError::BadRequest(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_and_small_data_uri() {
        assert!(DATA_URI.is_ok());
        assert!(validate_avatar("https://cdn.example.com/a.png").is_ok());
        assert!(validate_avatar("data:image/png;base64,iVBORw0KGgo=").is_ok());
        assert!(validate_avatar("data:image/jpeg;base64,/9j/4AAQ").is_ok());
    }

    #[test]
    fn rejects_other_forms() {
        for avatar in [
            "http://cdn.example.com/a.png",
            "data:image/gif;base64,R0lGOD",
            "data:image/png,notbase64",
            "data:image/png;base64,@@@",
            "javascript:alert(1)",
            "",
        ] {
            assert!(
                matches!(validate_avatar(avatar), Err(ServiceError::BadRequest(_))),
                "{avatar}"
            );
        }
    }

    #[test]
    fn rejects_oversized_data_uri() {
        let avatar = format!("data:image/png;base64,{}", "A".repeat(MAX_AVATAR_BYTES));
        assert!(validate_avatar(&avatar).is_err());
    }
}
