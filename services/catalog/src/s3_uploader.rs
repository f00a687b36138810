use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A poster image received from a client
#[derive(Debug, Clone)]
pub struct PosterUpload {
    /// Media the poster belongs to
    pub media_id: String,
    /// Original file name, if the client sent one
    pub file_name: Option<String>,
    /// Declared content type, if any
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Remote storage for poster images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PosterStore: Send + Sync {
    /// Store the image and return the URL it is reachable at
    async fn upload_poster(&self, upload: PosterUpload) -> Result<String>;
}

/// S3 uploader for poster images
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3Uploader {
    /// Create a new S3 uploader
    ///
    /// Credentials come from the standard AWS provider chain
    /// (`AWS_ACCESS_KEY_ID`, profiles, instance metadata).
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 uploader initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Public URL of an uploaded object
    pub fn object_url(&self, key: &str) -> String {
        object_url(&self.config, key)
    }
}

#[async_trait]
impl PosterStore for S3Uploader {
    #[instrument(skip(self, upload), fields(media_id = %upload.media_id, size_bytes = upload.data.len()))]
    async fn upload_poster(&self, upload: PosterUpload) -> Result<String> {
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(upload.file_name.as_deref()).to_string());
        let key = poster_key(&self.config.key_prefix, &upload.media_id, &content_type);

        debug!(s3_key = %key, "Uploading poster to S3");

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(upload.data))
            .content_type(&content_type)
            .metadata("media-id", &upload.media_id);

        if let Some(ref file_name) = upload.file_name {
            request = request.metadata("original-name", sanitize_path_component(file_name));
        }

        request
            .send()
            .await
            .context("Failed to upload poster to S3")?;

        info!(s3_key = %key, "Poster uploaded successfully");

        Ok(self.object_url(&key))
    }
}

/// Key format: {prefix}/{media_id}/{uuid}.{ext}
fn poster_key(prefix: &str, media_id: &str, content_type: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = format!(
        "{media_id}/{id}.{ext}",
        media_id = sanitize_path_component(media_id),
        id = Uuid::new_v4().simple(),
        ext = extension_for(content_type),
    );

    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

fn object_url(config: &S3Config, key: &str) -> String {
    if let Some(ref base) = config.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }

    match config.endpoint_url {
        Some(ref endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), config.bucket, key),
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

/// Sanitize a path component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .replace("..", "__")
}

/// Guess the content type from a file name
fn content_type_for(file_name: Option<&str>) -> &'static str {
    let ext = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    match ext.as_deref() {
        Some("jpeg" | "jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            bucket: "posters".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            key_prefix: "posters/medias".to_string(),
            public_base_url: None,
        }
    }

    #[test]
    fn test_poster_key_layout() {
        let key = poster_key("/posters/medias/", "abc123", "image/png");

        assert!(key.starts_with("posters/medias/abc123/"));
        assert!(key.ends_with(".png"));
        assert_eq!(key.split('/').count(), 4);
    }

    #[test]
    fn test_poster_key_without_prefix() {
        let key = poster_key("", "../etc", "image/jpeg");
        assert!(key.starts_with("___etc/"));
        assert!(key.ends_with(".jpg"));
    }

    #[test]
    fn test_object_url_variants() {
        let mut config = test_config();
        assert_eq!(
            object_url(&config, "posters/a.png"),
            "https://posters.s3.eu-west-1.amazonaws.com/posters/a.png"
        );

        config.endpoint_url = Some("http://localhost:9000/".to_string());
        assert_eq!(
            object_url(&config, "posters/a.png"),
            "http://localhost:9000/posters/posters/a.png"
        );

        config.public_base_url = Some("https://cdn.example.com".to_string());
        assert_eq!(
            object_url(&config, "posters/a.png"),
            "https://cdn.example.com/posters/a.png"
        );
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("poster-01.jpg"), "poster-01.jpg");
        assert_eq!(sanitize_path_component("dir/poster"), "dir_poster");
        assert_eq!(sanitize_path_component("a..b"), "a__b");
        assert_eq!(sanitize_path_component("hello world"), "hello_world");
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(content_type_for(Some("p.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Some("p.png")), "image/png");
        assert_eq!(content_type_for(Some("poster")), "application/octet-stream");
        assert_eq!(content_type_for(None), "application/octet-stream");
        assert_eq!(extension_for("IMAGE/WEBP"), "webp");
        assert_eq!(extension_for("text/plain"), "bin");
    }
}
