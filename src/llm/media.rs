use std::io::Cursor;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use crate::utils::http::{get_http_client, truncate_for_log};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UploadError {
    #[error("image payload is empty")]
    Empty,
    #[error("image is not valid base64")]
    InvalidBase64,
    #[error("image is larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error("uploaded file is not a supported image (JPEG, PNG, WebP, GIF, BMP, TIFF or HEIC)")]
    NotAnImage,
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if matches!(brand, b"heic" | b"heix" | b"heif" | b"hevc" | b"mif1" | b"msf1") {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let client = get_http_client();
    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(
                    "Failed to fetch media {url}: {err} (timeout={}, connect={}, status={:?}, attempt={}/{})",
                    err.is_timeout(),
                    err.is_connect(),
                    err.status(),
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if !should_retry_error(&err) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    return None;
                }
                let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Media download failed for {url} with status {}: {}",
                status,
                truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
            );
            if !should_retry_status(status) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                return None;
            }
            let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
            tokio::time::sleep(delay).await;
            continue;
        }

        return match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(err) => {
                error!(
                    "Failed to read media bytes {url}: {err} (attempt={}/{})",
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    None
                } else {
                    let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        };
    }

    None
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaFile {
    pub fn new(bytes: Vec<u8>, mime_type: String) -> Self {
        Self { bytes, mime_type }
    }
}

/// Accepts raw base64 or a `data:<mime>;base64,<payload>` URI.
pub fn decode_base64_image(input: &str, max_bytes: usize) -> Result<Vec<u8>, UploadError> {
    let trimmed = input.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or(UploadError::InvalidBase64)?,
        None => trimmed,
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(UploadError::Empty);
    }
    // base64 inflates by 4/3; reject before decoding anything huge.
    if payload.len() / 4 * 3 > max_bytes.saturating_add(3) {
        return Err(UploadError::TooLarge { limit: max_bytes });
    }

    let bytes = general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|_| UploadError::InvalidBase64)?;
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge { limit: max_bytes });
    }
    Ok(bytes)
}

/// Checks the upload is a decodable image and shrinks it to `max_dimension` when needed.
pub fn prepare_upload(bytes: Vec<u8>, max_dimension: u32) -> Result<MediaFile, UploadError> {
    let mime_type = detect_mime_type(&bytes).ok_or(UploadError::NotAnImage)?;
    if !mime_type.starts_with("image/") {
        return Err(UploadError::NotAnImage);
    }
    // The decoder lacks HEIC support; hand those straight to the model.
    if mime_type == "image/heic" {
        return Ok(MediaFile::new(bytes, mime_type));
    }

    let decoded = image::load_from_memory(&bytes).map_err(|_| UploadError::NotAnImage)?;
    if max_dimension == 0 || (decoded.width() <= max_dimension && decoded.height() <= max_dimension)
    {
        return Ok(MediaFile::new(bytes, mime_type));
    }

    debug!(
        "Downscaling upload from {}x{} to fit {}px",
        decoded.width(),
        decoded.height(),
        max_dimension
    );
    let resized = decoded.thumbnail(max_dimension, max_dimension);
    let mut encoded = Cursor::new(Vec::new());
    resized
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|_| UploadError::NotAnImage)?;
    Ok(MediaFile::new(encoded.into_inner(), "image/png".to_string()))
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 60, 200]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_raw_and_data_uri_payloads() {
        let png = png_fixture(2, 2);
        let raw = general_purpose::STANDARD.encode(&png);
        assert_eq!(decode_base64_image(&raw, 1024).unwrap(), png);

        let uri = format!("data:image/png;base64,{raw}");
        assert_eq!(decode_base64_image(&uri, 1024).unwrap(), png);
    }

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(decode_base64_image("   ", 1024), Err(UploadError::Empty));
        assert_eq!(
            decode_base64_image("not base64!!", 1024),
            Err(UploadError::InvalidBase64)
        );
        assert_eq!(
            decode_base64_image("data:image/png;base64", 1024),
            Err(UploadError::InvalidBase64)
        );
        let big = general_purpose::STANDARD.encode(vec![0u8; 4096]);
        assert_eq!(
            decode_base64_image(&big, 1024),
            Err(UploadError::TooLarge { limit: 1024 })
        );
    }

    #[test]
    fn small_images_pass_through_untouched() {
        let png = png_fixture(8, 4);
        let file = prepare_upload(png.clone(), 64).unwrap();
        assert_eq!(file.mime_type, "image/png");
        assert_eq!(file.bytes, png);
    }

    #[test]
    fn oversized_images_are_downscaled() {
        let file = prepare_upload(png_fixture(200, 100), 50).unwrap();
        let decoded = image::load_from_memory(&file.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 25));
        assert_eq!(file.mime_type, "image/png");
    }

    #[test]
    fn non_images_are_refused() {
        assert_eq!(
            prepare_upload(b"%PDF-1.4 fake document".to_vec(), 64).unwrap_err(),
            UploadError::NotAnImage
        );
        assert_eq!(
            prepare_upload(b"hello".to_vec(), 64).unwrap_err(),
            UploadError::NotAnImage
        );
    }

    fn encoded(image: image::DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn gif_and_bmp_uploads_are_accepted() {
        let rgba = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            6,
            6,
            image::Rgba([200, 10, 10, 255]),
        ));

        let gif = encoded(rgba.clone(), ImageFormat::Gif);
        assert_eq!(prepare_upload(gif, 64).unwrap().mime_type, "image/gif");

        let bmp = encoded(rgba.clone(), ImageFormat::Bmp);
        assert_eq!(prepare_upload(bmp, 64).unwrap().mime_type, "image/bmp");

        let shrunk = prepare_upload(encoded(rgba, ImageFormat::Bmp), 3).unwrap();
        assert_eq!(shrunk.mime_type, "image/png");
    }

    #[test]
    fn heif_brands_pass_through_to_the_model() {
        let mut mif1 = vec![0, 0, 0, 24];
        mif1.extend_from_slice(b"ftypmif1");
        mif1.extend_from_slice(&[0; 16]);
        let file = prepare_upload(mif1.clone(), 64).unwrap();
        assert_eq!(file.mime_type, "image/heic");
        assert_eq!(file.bytes, mif1);
    }
}
