//! Content upload request construction.
//!
//! Image processing (scaling, perceptual hashing) happens in the caller; this
//! module only hashes what it is handed and lays the request out.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use sha1::{Digest, Sha1};

use crate::net::HttpRequest;

pub const UPLOAD_HOST: &str = "platform.kik.com";

/// Hashes the upload server checks against the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHashes {
    /// Uppercase hex SHA-1 of the original bytes.
    pub sha1_original: String,
    /// Uppercase hex SHA-1 of the scaled preview.
    pub sha1_scaled: String,
    /// Perceptual block-hash of the scaled preview.
    pub blockhash_scaled: String,
    /// Base64 MD5 of the original bytes.
    pub md5: String,
}

impl ContentHashes {
    pub fn compute(original: &[u8], scaled: &[u8], blockhash_scaled: impl Into<String>) -> Self {
        Self {
            sha1_original: hex::encode_upper(Sha1::digest(original)),
            sha1_scaled: hex::encode_upper(Sha1::digest(scaled)),
            blockhash_scaled: blockhash_scaled.into(),
            md5: BASE64_STANDARD.encode(md5::compute(original).0),
        }
    }
}

/// A single-chunk content upload.
#[derive(Debug, Clone)]
pub struct ContentUpload<'a> {
    pub content_id: &'a str,
    pub app_id: &'a str,
    pub content_type: &'a str,
    pub extension: &'a str,
    pub data: &'a [u8],
    pub hashes: &'a ContentHashes,
}

/// Who is uploading.
#[derive(Debug, Clone)]
pub struct UploadAuth<'a> {
    pub jid: &'a str,
    pub password_key: &'a str,
    pub version: &'a str,
}

pub fn content_upload_request(upload: &ContentUpload<'_>, auth: &UploadAuth<'_>) -> HttpRequest {
    let size = upload.data.len().to_string();
    HttpRequest::put(
        format!("https://{UPLOAD_HOST}/content/files/{}", upload.content_id),
        upload.data.to_vec(),
    )
        .with_header("Host", UPLOAD_HOST)
        .with_header("User-Agent", format!("Kik/{} (Android 7.1.2) Content", auth.version))
        .with_header("Content-Type", upload.content_type)
        .with_header("x-kik-jid", auth.jid)
        .with_header("x-kik-password", auth.password_key)
        .with_header("x-kik-app-id", upload.app_id)
        .with_header("x-kik-content-chunks", "1")
        .with_header("x-kik-content-size", size)
        .with_header("x-kik-content-md5", upload.hashes.md5.as_str())
        .with_header("x-kik-chunk-number", "0")
        .with_header("x-kik-chunk-md5", upload.hashes.md5.as_str())
        .with_header("x-kik-sha1-original", upload.hashes.sha1_original.as_str())
        .with_header("x-kik-sha1-scaled", upload.hashes.sha1_scaled.as_str())
        .with_header("x-kik-blockhash-scaled", upload.hashes.blockhash_scaled.as_str())
        .with_header("x-kik-content-extension", upload.extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_hash_headers() {
        let hashes = ContentHashes::compute(b"abc", b"ab", "ffff0000");
        assert_eq!(hashes.sha1_original, "A9993E364706816ABA3E25717850C26C9CD0D89D");
        assert_eq!(hashes.md5, "kAFQmDzST7DWlj99KOF/cg==");

        let upload = ContentUpload {
            content_id: "c-1",
            app_id: "com.kik.ext.gallery",
            content_type: "image/jpeg",
            extension: ".jpg",
            data: b"abc",
            hashes: &hashes,
        };
        let auth = UploadAuth {
            jid: "me_a1@talk.kik.com",
            password_key: "00ff",
            version: "15.25.0.22493",
        };
        let request = content_upload_request(&upload, &auth);
        assert_eq!(request.url, "https://platform.kik.com/content/files/c-1");
        assert_eq!(request.headers["x-kik-sha1-scaled"], hashes.sha1_scaled);
        assert_eq!(request.headers["x-kik-blockhash-scaled"], "ffff0000");
        assert_eq!(request.headers["x-kik-content-size"], "3");
        assert_eq!(request.body, b"abc");
    }
}
