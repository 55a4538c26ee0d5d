//! Pathname utilities.
//!
//! Pure functions that validate storage keys and reduce externally supplied
//! URLs back to trusted keys. Nothing in here performs I/O.
//!
//! [`extract_pathname_from_url`] is the only way a stored URL (possibly issued by
//! a provider) should become a key for deletion or re-signing. It rejects anything
//! that is not demonstrably one of our own objects.

use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use url::Url;

use crate::buckets::Bucket;
use crate::error::ValidationError;

/// Host suffix of the primary (Blob) backend. Covers both the public and the
/// private store subdomains.
pub const PRIMARY_STORAGE_HOST_SUFFIX: &str = "blob.vercel-storage.com";

/// Content type used when the extension is unknown or missing.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Virtual-hosted S3 URLs from the previous storage layout, e.g.
/// `bucket.s3.us-east-1.amazonaws.com` or `bucket.s3-eu-west-1.amazonaws.com`.
static LEGACY_S3_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]*\.s3[.-](?:[a-z0-9-]+\.)?amazonaws\.com$")
        .expect("legacy host pattern is valid")
});

/// A leading `host.tld` segment; a bare domain must never be read as a key.
static DOMAIN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}(?::\d+)?(?:/|$)")
        .expect("domain pattern is valid")
});

static DEFAULT_TRUSTED_HOSTS: LazyLock<TrustedHosts> = LazyLock::new(TrustedHosts::default);

/// Reject traversal sequences and null bytes.
pub fn validate_pathname(pathname: &str) -> Result<(), ValidationError> {
    if pathname.is_empty() {
        return Err(ValidationError::InvalidPathname(
            "pathname must not be empty".to_string(),
        ));
    }
    if pathname.contains('\0') {
        return Err(ValidationError::InvalidPathname(
            "pathname contains a null byte".to_string(),
        ));
    }
    if pathname.contains("../")
        || pathname.contains("..\\")
        || pathname.split(['/', '\\']).any(|segment| segment == "..")
    {
        return Err(ValidationError::InvalidPathname(format!(
            "path traversal in {}",
            pathname
        )));
    }
    Ok(())
}

/// Allow-list of storage hosts whose URLs may be turned back into pathnames.
#[derive(Debug, Clone)]
pub struct TrustedHosts {
    suffixes: Vec<String>,
    legacy_s3: bool,
}

impl Default for TrustedHosts {
    fn default() -> Self {
        TrustedHosts {
            suffixes: vec![PRIMARY_STORAGE_HOST_SUFFIX.to_string()],
            legacy_s3: true,
        }
    }
}

impl TrustedHosts {
    /// An allow-list with no entries; every URL is untrusted.
    pub fn empty() -> Self {
        TrustedHosts {
            suffixes: Vec::new(),
            legacy_s3: false,
        }
    }

    /// Trust `suffix` and any subdomain of it.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into().trim().trim_start_matches('.').to_lowercase();
        if !suffix.is_empty() && !self.suffixes.contains(&suffix) {
            self.suffixes.push(suffix);
        }
        self
    }

    pub fn with_suffixes<I, S>(self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        suffixes.into_iter().fold(self, |acc, s| acc.with_suffix(s))
    }

    /// Accept or refuse the legacy S3 host family.
    pub fn with_legacy_s3(mut self, enabled: bool) -> Self {
        self.legacy_s3 = enabled;
        self
    }

    pub fn is_trusted(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        let suffix_match = self.suffixes.iter().any(|suffix| {
            host == *suffix
                || host
                    .strip_suffix(suffix.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        });
        suffix_match || (self.legacy_s3 && LEGACY_S3_HOST.is_match(&host))
    }

    /// See [`extract_pathname_from_url`].
    pub fn extract_pathname(&self, input: &str) -> Result<String, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyPathname);
        }

        // URL parsing collapses dot segments (including `%2e%2e`), so traversal has
        // to be caught on the raw text first.
        reject_encoded_traversal(input)?;

        match Url::parse(input) {
            Ok(url) => self.pathname_from_url(&url),
            Err(_) => pathname_from_bare(input),
        }
    }

    fn pathname_from_url(&self, url: &Url) -> Result<String, ValidationError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::UntrustedHost(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ValidationError::UntrustedHost(url.to_string()))?;
        if !self.is_trusted(host) {
            return Err(ValidationError::UntrustedHost(host.to_string()));
        }

        let raw = url.path().strip_prefix('/').unwrap_or(url.path());
        let decoded = urlencoding::decode(raw).map_err(|_| {
            ValidationError::InvalidPathname("path is not valid UTF-8".to_string())
        })?;
        if decoded.is_empty() {
            return Err(ValidationError::EmptyPathname);
        }
        validate_pathname(&decoded)?;
        Ok(decoded.into_owned())
    }
}

fn reject_encoded_traversal(input: &str) -> Result<(), ValidationError> {
    let decoded = urlencoding::decode_binary(input.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);
    let has_traversal_segment = decoded
        .split(['/', '\\', '?', '#'])
        .any(|segment| segment == "..");
    if decoded.contains('\0') || has_traversal_segment {
        return Err(ValidationError::InvalidPathname(format!(
            "path traversal in {}",
            input
        )));
    }
    Ok(())
}

fn pathname_from_bare(input: &str) -> Result<String, ValidationError> {
    if input.contains("://") || input.starts_with("//") {
        return Err(ValidationError::MalformedInput(input.to_string()));
    }
    let stripped = input.strip_prefix('/').unwrap_or(input);
    if DOMAIN_SHAPE.is_match(stripped) {
        return Err(ValidationError::SuspiciousPattern(input.to_string()));
    }
    if stripped.is_empty() {
        return Err(ValidationError::EmptyPathname);
    }
    validate_pathname(stripped)?;
    Ok(stripped.to_string())
}

/// Reduce a stored URL or a bare pathname to a validated, decoded pathname,
/// using the default trusted hosts (primary Blob domain plus legacy S3 hosts).
pub fn extract_pathname_from_url(input: &str) -> Result<String, ValidationError> {
    DEFAULT_TRUSTED_HOSTS.extract_pathname(input)
}

/// `{org_id}/{segments...}` with stray separators removed from each part.
pub fn build_org_path(org_id: &str, segments: &[&str]) -> String {
    std::iter::once(org_id)
        .chain(segments.iter().copied())
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decomposed tenant-scoped pathname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgPath {
    pub bucket: Option<Bucket>,
    pub org_id: String,
    pub path: String,
}

/// Split off the bucket prefix (if any) and the tenant identifier. `None` when
/// fewer than two segments remain after the prefix.
pub fn parse_org_path(pathname: &str) -> Option<OrgPath> {
    let pathname = pathname.trim_start_matches('/');
    let bucket = Bucket::of_pathname(pathname);
    let rest = match bucket {
        Some(b) => &pathname[b.prefix().len()..],
        None => pathname,
    };
    let (org_id, path) = rest.split_once('/')?;
    if org_id.is_empty() || path.is_empty() {
        return None;
    }
    Some(OrgPath {
        bucket,
        org_id: org_id.to_string(),
        path: path.to_string(),
    })
}

/// Extension-to-MIME lookup. Never fails; unknown or missing extensions map to
/// [`DEFAULT_CONTENT_TYPE`].
pub fn content_type_from_filename(filename: &str) -> &'static str {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };
    if stem.is_empty() {
        return DEFAULT_CONTENT_TYPE;
    }
    match ext.to_ascii_lowercase().as_str() {
        // documents
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "rtf" => "application/rtf",
        // images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        // archives
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        // installers
        "pkg" => "application/x-newton-compatible-pkg",
        "dmg" => "application/x-apple-diskimage",
        "exe" => "application/x-msdownload",
        "msi" => "application/x-msi",
        "deb" => "application/vnd.debian.binary-package",
        "rpm" => "application/x-rpm",
        "sh" => "application/x-sh",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Decode base64, transparently stripping a `data:<mime>;base64,` prefix.
pub fn base64_to_bytes(input: &str) -> Result<Vec<u8>, ValidationError> {
    let payload = match input.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| {
                ValidationError::InvalidBase64("data URL is not base64 encoded".to_string())
            })?,
        None => input,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ValidationError::InvalidBase64(e.to_string()))
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trusted_for_tests() -> TrustedHosts {
        TrustedHosts::default().with_suffix("blob.trusted-storage.com")
    }

    #[test]
    fn test_validate_pathname_rejects_traversal() {
        assert!(matches!(
            validate_pathname("a/../b"),
            Err(ValidationError::InvalidPathname(_))
        ));
        assert!(validate_pathname("a\\..\\b").is_err());
        assert!(validate_pathname("attachments/org1/..").is_err());
        assert!(validate_pathname("attachments/org\0/a.pdf").is_err());
        assert!(validate_pathname("").is_err());
    }

    #[test]
    fn test_validate_pathname_accepts_dotted_names() {
        assert!(validate_pathname("attachments/org1/report..final.pdf").is_ok());
        assert!(validate_pathname("attachments/org1/.hidden").is_ok());
        assert!(validate_pathname("attachments/org1/file.pdf").is_ok());
    }

    #[test]
    fn test_extract_bare_pathname_unchanged() {
        assert_eq!(
            extract_pathname_from_url("attachments/org1/file.pdf").unwrap(),
            "attachments/org1/file.pdf"
        );
        assert_eq!(
            extract_pathname_from_url("/attachments/org1/file.pdf").unwrap(),
            "attachments/org1/file.pdf"
        );
    }

    #[test]
    fn test_extract_rejects_bare_traversal() {
        assert!(matches!(
            extract_pathname_from_url("attachments/../../etc/passwd"),
            Err(ValidationError::InvalidPathname(_))
        ));
    }

    #[test]
    fn test_extract_trusted_url() {
        let hosts = trusted_for_tests();
        assert_eq!(
            hosts
                .extract_pathname("https://example-tenant.blob.trusted-storage.com/attachments/x.pdf")
                .unwrap(),
            "attachments/x.pdf"
        );
        assert_eq!(
            extract_pathname_from_url(
                "https://abc123.public.blob.vercel-storage.com/org-assets/acme/logo%20v2.png"
            )
            .unwrap(),
            "org-assets/acme/logo v2.png"
        );
    }

    #[test]
    fn test_extract_legacy_s3_url() {
        assert_eq!(
            extract_pathname_from_url(
                "https://acme-files.s3.us-east-1.amazonaws.com/attachments/org1/a.pdf?X-Amz-Expires=900"
            )
            .unwrap(),
            "attachments/org1/a.pdf"
        );
        let strict = TrustedHosts::default().with_legacy_s3(false);
        assert!(matches!(
            strict.extract_pathname("https://acme-files.s3.amazonaws.com/attachments/a.pdf"),
            Err(ValidationError::UntrustedHost(_))
        ));
    }

    #[test]
    fn test_extract_untrusted_host() {
        let hosts = trusted_for_tests();
        assert!(matches!(
            hosts.extract_pathname("https://evil.example.com/attachments/x.pdf"),
            Err(ValidationError::UntrustedHost(_))
        ));
        // suffix must match on a label boundary
        assert!(matches!(
            hosts.extract_pathname("https://evilblob.trusted-storage.com/attachments/x.pdf"),
            Err(ValidationError::UntrustedHost(_))
        ));
        assert!(matches!(
            extract_pathname_from_url("http://nested/attachments/x"),
            Err(ValidationError::UntrustedHost(_))
        ));
    }

    #[test]
    fn test_extract_malformed_input() {
        assert!(matches!(
            extract_pathname_from_url("attachments/http://nested/attachments/x"),
            Err(ValidationError::MalformedInput(_))
        ));
        assert!(matches!(
            extract_pathname_from_url("//evil.example.com/attachments/x"),
            Err(ValidationError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_extract_suspicious_domain_shape() {
        assert!(matches!(
            extract_pathname_from_url("evil.example.com/attachments/x.pdf"),
            Err(ValidationError::SuspiciousPattern(_))
        ));
        assert!(matches!(
            extract_pathname_from_url("/evil.com"),
            Err(ValidationError::SuspiciousPattern(_))
        ));
    }

    #[test]
    fn test_extract_empty() {
        assert_eq!(extract_pathname_from_url("  "), Err(ValidationError::EmptyPathname));
        assert_eq!(extract_pathname_from_url("/"), Err(ValidationError::EmptyPathname));
        assert_eq!(
            extract_pathname_from_url("https://store.public.blob.vercel-storage.com/"),
            Err(ValidationError::EmptyPathname)
        );
    }

    #[test]
    fn test_extract_rejects_traversal_hidden_by_url_normalization() {
        assert!(matches!(
            extract_pathname_from_url(
                "https://store.public.blob.vercel-storage.com/attachments/../../etc/passwd"
            ),
            Err(ValidationError::InvalidPathname(_))
        ));
        assert!(matches!(
            extract_pathname_from_url(
                "https://store.public.blob.vercel-storage.com/attachments/%2e%2e/secret"
            ),
            Err(ValidationError::InvalidPathname(_))
        ));
        assert!(extract_pathname_from_url("attachments/a%00.pdf").is_err());
    }

    #[test]
    fn test_org_path_helpers() {
        assert_eq!(
            build_org_path("org_123", &["policies", "/v2/", "policy.pdf"]),
            "org_123/policies/v2/policy.pdf"
        );

        let parsed = parse_org_path("attachments/org_123/task/file.pdf").unwrap();
        assert_eq!(parsed.bucket, Some(Bucket::Attachments));
        assert_eq!(parsed.org_id, "org_123");
        assert_eq!(parsed.path, "task/file.pdf");

        let unprefixed = parse_org_path("org_9/logo.png").unwrap();
        assert_eq!(unprefixed.bucket, None);
        assert_eq!(unprefixed.org_id, "org_9");

        assert!(parse_org_path("attachments/org_123").is_none());
        assert!(parse_org_path("single").is_none());
        assert!(parse_org_path("").is_none());
    }

    #[test]
    fn test_content_type_lookup() {
        assert_eq!(content_type_from_filename("policy.PDF"), "application/pdf");
        assert_eq!(content_type_from_filename("attachments/o/logo.png"), "image/png");
        assert_eq!(content_type_from_filename("agent.pkg"), "application/x-newton-compatible-pkg");
        assert_eq!(content_type_from_filename("bundle.zip"), "application/zip");
    }

    #[test]
    fn test_content_type_defaults_to_binary() {
        assert_eq!(content_type_from_filename("README"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_from_filename("archive.unknownext"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_from_filename(".bashrc"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_from_filename(""), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_from_filename("trailing."), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_base64_roundtrip() {
        let samples: [&[u8]; 4] = [b"", b"a", b"hello world", &[0u8, 255, 1, 254, 128]];
        for sample in samples {
            assert_eq!(base64_to_bytes(&bytes_to_base64(sample)).unwrap(), sample);
        }
        let all_bytes: Vec<u8> = (0..=255u8).collect();
        assert_eq!(base64_to_bytes(&bytes_to_base64(&all_bytes)).unwrap(), all_bytes);
    }

    #[test]
    fn test_base64_strips_data_url_prefix() {
        let encoded = format!("data:application/pdf;base64,{}", bytes_to_base64(b"%PDF-1.7"));
        assert_eq!(base64_to_bytes(&encoded).unwrap(), b"%PDF-1.7");
        assert!(matches!(
            base64_to_bytes("data:text/plain,hello"),
            Err(ValidationError::InvalidBase64(_))
        ));
        assert!(base64_to_bytes("not base64!!").is_err());
    }
}
