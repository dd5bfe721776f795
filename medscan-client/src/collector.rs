use medscan_flow::Context;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::{
    api::StorageClient,
    config::InvalidImagePolicy,
    error::{Result, ScanError},
    keys,
    models::{ImagePreview, ImageReference, UploadedImage},
};

/// Holds the one image the user picked and ships it to storage on submit.
/// All state lives in the session context handed to each call.
pub struct UploadCollector {
    policy: InvalidImagePolicy,
}

impl UploadCollector {
    pub fn new(policy: InvalidImagePolicy) -> Self {
        Self { policy }
    }

    /// Make `image` the current selection.
    ///
    /// Anything whose declared type is not `image/*` leaves the current
    /// selection untouched; depending on the policy this is either silent
    /// (`Ok(None)`) or reported as `InvalidImageType`.
    pub async fn select_image(
        &self,
        context: &Context,
        image: UploadedImage,
    ) -> Result<Option<ImagePreview>> {
        if !image.is_image() {
            warn!(
                "Ignoring {}: declared type {} is not an image",
                image.file_name, image.media_type
            );
            return match self.policy {
                InvalidImagePolicy::Ignore => Ok(None),
                InvalidImagePolicy::Notify => Err(ScanError::InvalidImageType {
                    media_type: image.media_type,
                }),
            };
        }

        let preview = build_preview(&image).await;
        context.set(keys::IMAGE, &image).await?;
        context.set(keys::PREVIEW, &preview).await?;

        info!("Selected {}", preview);
        Ok(Some(preview))
    }

    pub async fn clear(&self, context: &Context) {
        context.remove(keys::IMAGE).await;
        context.remove(keys::PREVIEW).await;
    }

    pub async fn current_image(&self, context: &Context) -> Option<UploadedImage> {
        context.get(keys::IMAGE).await
    }

    /// Send the selected image to storage. On failure the selection stays in
    /// place so the user can retry without picking the file again.
    pub async fn submit(
        &self,
        context: &Context,
        storage: &dyn StorageClient,
    ) -> Result<ImageReference> {
        let image: UploadedImage = context
            .get(keys::IMAGE)
            .await
            .ok_or(ScanError::NoImageSelected)?;

        let bytes = image.read_bytes().await.map_err(|e| {
            ScanError::UploadFailed(format!("cannot read {}: {}", image.path.display(), e))
        })?;

        let reference = storage.upload(&image, bytes).await?;
        context.set(keys::REFERENCE, &reference).await?;

        Ok(reference)
    }
}

async fn build_preview(image: &UploadedImage) -> ImagePreview {
    ImagePreview {
        file_name: image.file_name.clone(),
        size_label: image.size_label(),
        dimensions: read_dimensions(image.path.clone()).await,
    }
}

/// Decodes only the image header; a file that cannot be decoded still gets a
/// preview, just without dimensions.
async fn read_dimensions(path: PathBuf) -> Option<(u32, u32)> {
    tokio::task::spawn_blocking(move || {
        image::ImageReader::open(&path)
            .ok()?
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    })
    .await
    .ok()
    .flatten()
}
