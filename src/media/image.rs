use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    config::Settings,
    constants::IMAGE_FORMATS,
    error::{ErrorKind, FieldError, MediaError},
};

/// Image as it arrives in a write payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `data:image/<format>;base64,<payload>`, decoded.
    Upload { extension: String, bytes: Vec<u8> },
    /// Already hosted somewhere, kept as is.
    Reference(String),
}

impl ImageSource {
    pub fn parse(field: &str, raw: &str) -> Result<Self, FieldError> {
        let raw = raw.trim();

        if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with('/') {
            return Ok(Self::Reference(raw.to_string()));
        }

        let invalid = |info: &str| ErrorKind::Validation.on(field, info);

        let Some(rest) = raw.strip_prefix("data:image/") else {
            return Err(invalid("Expected a base64 data URL or an image URL."));
        };
        let Some((format, payload)) = rest.split_once(";base64,") else {
            return Err(invalid("Expected a base64 data URL or an image URL."));
        };

        let extension = IMAGE_FORMATS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(format))
            .map(|(_, extension)| extension.to_string())
            .ok_or_else(|| invalid(&format!("Unsupported image format `{format}`.")))?;

        let bytes = STANDARD
            .decode(payload)
            .map_err(|_| invalid("Invalid base64 payload."))?;
        if bytes.is_empty() {
            return Err(invalid("The submitted file is empty."));
        }

        Ok(Self::Upload { extension, bytes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub reference: String,
    /// Whether the call wrote a new file, which the caller owns until its
    /// transaction commits.
    pub created: bool,
}

/// Local media directory served under `url`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url: String,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>, url: &str) -> Self {
        let url = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };

        Self {
            root: root.into(),
            url,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.media_root, &settings.media_url)
    }

    pub async fn store(&self, dir: &str, image: ImageSource) -> Result<StoredImage, potion::Error> {
        match image {
            ImageSource::Reference(reference) => Ok(StoredImage {
                reference,
                created: false,
            }),
            ImageSource::Upload { extension, bytes } => {
                let relative = format!("{dir}/{}.{extension}", uuid::Uuid::new_v4());
                let path = self.root.join(&relative);

                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| MediaError::from(e).into())?;
                }
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| MediaError::from(e).into())?;

                log::trace!("> Stored image {}", path.display());

                Ok(StoredImage {
                    reference: format!("{}{relative}", self.url),
                    created: true,
                })
            }
        }
    }

    /// Deletes a file this storage handed out. References pointing anywhere
    /// else are left alone and reported as `false`.
    pub async fn remove(&self, reference: &str) -> Result<bool, potion::Error> {
        let Some(path) = self.path_for(reference) else {
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaError::from(e).into()),
        }
    }

    /// Best effort cleanup after a failed write.
    pub async fn discard(&self, image: &StoredImage) {
        if !image.created {
            return;
        }

        if let Err(e) = self.remove(&image.reference).await {
            log::warn!("Failed to discard orphaned image {}: {:?}", image.reference, e.info);
        }
    }

    /// Whether `reference` names a file this storage keeps under `dir`.
    pub fn stored_under(&self, dir: &str, reference: &str) -> bool {
        self.path_for(reference)
            .is_some_and(|path| path.starts_with(self.root.join(dir)))
    }

    pub fn is_local(&self, reference: &str) -> bool {
        reference.starts_with(&self.url)
    }

    pub fn path_for(&self, reference: &str) -> Option<PathBuf> {
        let relative = Path::new(reference.strip_prefix(&self.url)?);

        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() {
            return None;
        }

        Some(self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_kept_as_references() {
        assert_eq!(
            ImageSource::parse("image", "https://cdn.example.com/a.png"),
            Ok(ImageSource::Reference(String::from(
                "https://cdn.example.com/a.png"
            )))
        );
        assert_eq!(
            ImageSource::parse("image", "/media/recipes/images/a.png"),
            Ok(ImageSource::Reference(String::from(
                "/media/recipes/images/a.png"
            )))
        );
    }

    #[test]
    fn data_urls_are_decoded() {
        let raw = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"\xff\xd8\xff"));

        assert_eq!(
            ImageSource::parse("image", &raw),
            Ok(ImageSource::Upload {
                extension: String::from("jpg"),
                bytes: vec![0xff, 0xd8, 0xff],
            })
        );
    }

    #[test]
    fn broken_payloads_name_the_field() {
        for raw in [
            "data:image/png;base64,!!!",
            "data:image/bmp;base64,AAAA",
            "data:image/png;base64,",
            "data:text/plain;base64,AAAA",
            "just some text",
        ] {
            let error = ImageSource::parse("avatar", raw).unwrap_err();
            assert_eq!(error.field, "avatar", "{raw}");
            assert_eq!(error.kind, ErrorKind::Validation);
        }
    }

    #[test]
    fn only_own_references_map_to_paths() {
        let storage = MediaStorage::new("/srv/media", "/media");

        assert_eq!(
            storage.path_for("/media/recipes/images/a.png"),
            Some(PathBuf::from("/srv/media/recipes/images/a.png"))
        );
        assert_eq!(storage.path_for("https://cdn.example.com/a.png"), None);
        assert_eq!(storage.path_for("/media/../etc/passwd"), None);
        assert_eq!(storage.path_for("/media/"), None);
    }

    #[test]
    fn references_are_scoped_to_their_directory() {
        let storage = MediaStorage::new("/srv/media", "/media/");

        assert!(storage.stored_under("recipes/images", "/media/recipes/images/a.png"));
        assert!(!storage.stored_under("recipes/images", "/media/users/a.png"));
        assert!(!storage.stored_under("users", "/media/recipes/images/a.png"));
        assert!(!storage.stored_under("users", "/media/users-old/a.png"));
        assert!(!storage.stored_under("users", "https://cdn.example.com/media/users/a.png"));

        assert!(storage.is_local("/media/users/a.png"));
        assert!(!storage.is_local("https://cdn.example.com/a.png"));
    }

    #[tokio::test]
    async fn stored_uploads_can_be_removed_again() {
        let root = std::env::temp_dir().join(format!("foodgram-media-{}", uuid::Uuid::new_v4()));
        let storage = MediaStorage::new(&root, "/media/");

        let image = ImageSource::Upload {
            extension: String::from("png"),
            bytes: vec![1, 2, 3],
        };
        let stored = storage.store("recipes/images", image).await.ok().unwrap();

        assert!(stored.created);
        assert!(stored.reference.starts_with("/media/recipes/images/"));
        let path = storage.path_for(&stored.reference).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![1, 2, 3]);

        storage.discard(&stored).await;
        assert!(!path.exists());

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
