//! Image captioning collaborator.
//!
//! Used only to back-fill bot-generated alt-text suggestions on recorded
//! tweets. Captioning failures are never fatal to the pipeline.

use crate::error::Result;

/// Produces a textual description for an image.
pub trait Captioner {
    /// Caption the image at `image_url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the image cannot be fetched or captioned;
    /// callers treat this as "no suggestion available".
    fn caption(&self, image_url: &str) -> Result<String>;
}

/// Placeholder captioner until a real OCR/captioning backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubCaptioner;

impl Captioner for StubCaptioner {
    fn caption(&self, image_url: &str) -> Result<String> {
        Ok(format!("Caption for image {image_url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_names_the_image() {
        let caption = StubCaptioner.caption("https://pbs.twimg.com/img1.jpg").unwrap();
        assert!(caption.contains("img1.jpg"));
    }
}
