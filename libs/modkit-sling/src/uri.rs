//! URI reference resolution and validation.
//!
//! Resolution works on the URL text as written: an empty path stays empty and
//! percent-escapes are left alone. Only dot segments are removed, as RFC 3986
//! requires.

use crate::error::{HttpError, InvalidUriKind};
use iri_string::types::{UriAbsoluteStr, UriReferenceStr};
use url::{ParseError, Url};

/// Scheme lent to a relative base so it can take part in resolution.
const RELATIVE_BASE: &str = "x-relative:";

/// Resolve `reference` against `base` following RFC 3986 section 5.2.
///
/// An absolute `reference` replaces `base` entirely. A relative `base`
/// resolves like an absolute one, so `""` + `"foo"` is `"foo"` and `"a/"` +
/// `"b"` is `"a/b"`. Returns `None` when either operand is not a valid URI
/// reference.
pub(crate) fn resolve(base: &str, reference: &str) -> Option<String> {
    let reference = UriReferenceStr::new(reference).ok()?;
    // The base fragment never takes part in resolution.
    let base = base.split_once('#').map_or(base, |(rest, _)| rest);

    if let Ok(absolute) = UriAbsoluteStr::new(base) {
        return Some(reference.resolve_against(absolute).to_string());
    }

    UriReferenceStr::new(base).ok()?;
    let borrowed = format!("{RELATIVE_BASE}{base}");
    let absolute = UriAbsoluteStr::new(&borrowed).ok()?;
    let resolved = reference.resolve_against(absolute).to_string();
    Some(match resolved.strip_prefix(RELATIVE_BASE) {
        Some(relative) => relative.to_owned(),
        None => resolved,
    })
}

/// Check that the accumulated URL of a builder is absolute and names a host.
pub(crate) fn validate_absolute(raw: &str) -> Result<(), HttpError> {
    let url = Url::parse(raw).map_err(|e| HttpError::InvalidUri {
        url: raw.to_owned(),
        kind: match e {
            ParseError::RelativeUrlWithoutBase => InvalidUriKind::MissingScheme,
            ParseError::EmptyHost => InvalidUriKind::MissingAuthority,
            _ => InvalidUriKind::ParseError,
        },
        reason: e.to_string(),
    })?;

    if !url.has_host() {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "URL has no host".to_owned(),
        });
    }
    Ok(())
}
