//! Filename and URL conventions for stored artifacts.
//!
//! Uploads get a plain random name (`k3J9xQ0aLm2ZbT7c.png`). Derived
//! artifacts get a `tr-XXXXXX-` prefix in front of their source's base name:
//!
//! - `k3J9xQ0aLm2ZbT7c.png` → `tr-a8F2kd-k3J9xQ0aLm2ZbT7c.jpeg`
//! - `tr-a8F2kd-k3J9xQ0aLm2ZbT7c.jpeg` → `tr-Q0zzP1-k3J9xQ0aLm2ZbT7c.png`
//!
//! The prefix is replaced, never stacked, so a name carries at most one
//! derived segment however many times it is transformed. The random part
//! keeps concurrent writers from colliding without any locking.
//!
//! ## Public URLs
//!
//! `{scheme}://{host}[:{port}]/api/{version}/{file_name}`. `https` when the
//! request was secured, port shown only outside production.

use crate::config::ServiceConfig;
use crate::types::{FileType, RequestContext};
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Marker that opens every derived name.
pub const DERIVED_TAG: &str = "tr";
/// Length of the random segment inside the derived prefix.
pub const DERIVED_RANDOM_LEN: usize = 6;
/// Length of the random stem given to uploads.
pub const UPLOAD_NAME_LEN: usize = 16;

/// Total length of `tr-XXXXXX-`.
const DERIVED_PREFIX_LEN: usize = DERIVED_TAG.len() + 1 + DERIVED_RANDOM_LEN + 1;

/// Strip one `tr-XXXXXX-` segment from the front of `stem`, if present.
fn strip_derived_prefix(stem: &str) -> Option<&str> {
    let bytes = stem.as_bytes();
    if bytes.len() < DERIVED_PREFIX_LEN {
        return None;
    }
    let tag_end = DERIVED_TAG.len();
    let token_end = tag_end + 1 + DERIVED_RANDOM_LEN;
    let well_formed = stem.starts_with(DERIVED_TAG)
        && bytes[tag_end] == b'-'
        && bytes[tag_end + 1..token_end]
            .iter()
            .all(u8::is_ascii_alphanumeric)
        && bytes[token_end] == b'-';
    if !well_formed {
        return None;
    }
    // All checked bytes are ASCII, so this is a char boundary
    Some(&stem[DERIVED_PREFIX_LEN..])
}

/// Everything before the last `.`, or the whole name if it has no extension.
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// A stored name's stem with every leading derived prefix removed.
///
/// - `"k3J9xQ0aLm2ZbT7c"` → `"k3J9xQ0aLm2ZbT7c"`
/// - `"tr-a8F2kd-k3J9xQ0aLm2ZbT7c"` → `"k3J9xQ0aLm2ZbT7c"`
/// - `"tr-short-x"` → unchanged (segment is not 6 chars)
/// - `"tr-aaaaaa-tr-bbbbbb-x"` → `"x"`
pub fn base_stem(stem: &str) -> &str {
    let mut base = stem;
    while let Some(rest) = strip_derived_prefix(base) {
        base = rest;
    }
    base
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Name for a freshly uploaded artifact.
pub fn upload_file_name(file_type: FileType) -> String {
    format!(
        "{}.{}",
        random_alphanumeric(UPLOAD_NAME_LEN),
        file_type.extension()
    )
}

/// Name for an artifact derived from `source_file_name`, with a fresh token.
pub fn derived_file_name(source_file_name: &str, file_type: FileType) -> String {
    derived_file_name_with_token(
        source_file_name,
        file_type,
        &random_alphanumeric(DERIVED_RANDOM_LEN),
    )
}

/// Deterministic variant of [`derived_file_name`].
pub fn derived_file_name_with_token(
    source_file_name: &str,
    file_type: FileType,
    token: &str,
) -> String {
    let base = base_stem(file_stem(source_file_name));
    format!(
        "{}-{}-{}.{}",
        DERIVED_TAG,
        token,
        base,
        file_type.extension()
    )
}

/// Number of `tr-XXXXXX-` segments at the front of a name.
pub fn derived_depth(file_name: &str) -> usize {
    let mut depth = 0;
    let mut rest = file_stem(file_name);
    while let Some(tail) = strip_derived_prefix(rest) {
        depth += 1;
        rest = tail;
    }
    depth
}

/// Public URL for a stored file.
pub fn public_url(config: &ServiceConfig, ctx: &RequestContext, file_name: &str) -> String {
    let scheme = if ctx.secure { "https" } else { "http" };
    let authority = if config.environment.is_production() {
        ctx.host.clone()
    } else {
        format!("{}:{}", ctx.host, config.server.port)
    };
    format!(
        "{}://{}/api/{}/{}",
        scheme, authority, config.api_version, file_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    #[test]
    fn upload_name_shape() {
        let name = upload_file_name(FileType::Png);
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "png");
        assert_eq!(stem.len(), UPLOAD_NAME_LEN);
        assert!(stem.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(derived_depth(&name), 0);
    }

    #[test]
    fn upload_names_differ() {
        assert_ne!(
            upload_file_name(FileType::Jpeg),
            upload_file_name(FileType::Jpeg)
        );
    }

    #[test]
    fn derived_from_upload() {
        let name = derived_file_name_with_token("abc123.png", FileType::Jpeg, "Zx9y8W");
        assert_eq!(name, "tr-Zx9y8W-abc123.jpeg");
    }

    #[test]
    fn derived_from_derived_replaces_prefix() {
        let name = derived_file_name_with_token("tr-Zx9y8W-abc123.jpeg", FileType::Png, "q1w2e3");
        assert_eq!(name, "tr-q1w2e3-abc123.png");
    }

    #[test]
    fn repeated_derivation_never_stacks() {
        let mut name = upload_file_name(FileType::Png);
        let base = file_stem(&name).to_string();
        for i in 0..10 {
            let target = if i % 2 == 0 {
                FileType::Jpeg
            } else {
                FileType::Png
            };
            name = derived_file_name(&name, target);
            assert_eq!(derived_depth(&name), 1, "stacked prefix in {name}");
            assert!(name.ends_with(&format!("-{}.{}", base, target.extension())));
        }
    }

    #[test]
    fn random_token_has_expected_length() {
        let name = derived_file_name("abc.png", FileType::Png);
        let token = &name[DERIVED_TAG.len() + 1..DERIVED_PREFIX_LEN - 1];
        assert_eq!(token.len(), DERIVED_RANDOM_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(base_stem(file_stem(&name)), "abc");
    }

    #[test]
    fn only_well_formed_prefix_is_stripped() {
        // A plain "tr" start is not a derived prefix
        assert_eq!(base_stem("trolley"), "trolley");
        assert_eq!(base_stem("tr-short-x"), "tr-short-x");
        assert_eq!(base_stem("tr-abc!ef-x"), "tr-abc!ef-x");
    }

    #[test]
    fn stacked_prefixes_collapse() {
        assert_eq!(base_stem("tr-aaaaaa-tr-bbbbbb-base"), "base");
    }

    #[test]
    fn prefix_only_name_has_empty_base() {
        assert_eq!(base_stem("tr-aaaaaa-"), "");
    }

    #[test]
    fn non_ascii_stem_does_not_panic() {
        assert_eq!(base_stem("tr-ééé-x"), "tr-ééé-x");
        assert_eq!(derived_depth("tr-ééé-x.png"), 0);
    }

    #[test]
    fn file_stem_variants() {
        assert_eq!(file_stem("a.png"), "a");
        assert_eq!(file_stem("a.b.png"), "a.b");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(file_stem(".hidden"), ".hidden");
    }

    #[test]
    fn derived_depth_counts_segments() {
        assert_eq!(derived_depth("x.png"), 0);
        assert_eq!(derived_depth("tr-aaaaaa-x.png"), 1);
        assert_eq!(derived_depth("tr-aaaaaa-tr-bbbbbb-x.png"), 2);
    }

    // =========================================================================
    // public_url
    // =========================================================================

    fn ctx(secure: bool) -> RequestContext {
        RequestContext {
            secure,
            host: "img.example.com".to_string(),
        }
    }

    #[test]
    fn url_in_development_includes_port() {
        let config = ServiceConfig::default();
        assert_eq!(
            public_url(&config, &ctx(false), "a.png"),
            "http://img.example.com:3000/api/v1/a.png"
        );
    }

    #[test]
    fn url_in_production_omits_port() {
        let mut config = ServiceConfig::default();
        config.environment = Environment::Production;
        assert_eq!(
            public_url(&config, &ctx(true), "tr-abcdef-a.jpeg"),
            "https://img.example.com/api/v1/tr-abcdef-a.jpeg"
        );
    }

    #[test]
    fn url_uses_configured_version() {
        let mut config = ServiceConfig::default();
        config.api_version = "v2".to_string();
        config.server.port = 8080;
        assert_eq!(
            public_url(&config, &ctx(true), "a.png"),
            "https://img.example.com:8080/api/v2/a.png"
        );
    }
}
