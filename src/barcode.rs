use std::{fmt::Debug, path::Path};

use image::DynamicImage;
use rxing::DecodingHintDictionary;

/// The outcome of scanning an image file for a barcode.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Text payload of the first detected barcode, if any.
    pub barcode: Option<String>,
    pub image: Option<DynamicImage>,
}

impl ScanResult {
    pub fn not_found(image: DynamicImage) -> Self {
        Self {
            barcode: None,
            image: Some(image),
        }
    }
}

/// Finds barcodes in image files.
///
/// Implementations are blocking and are expected to be called from a
/// blocking-friendly thread.
#[cfg_attr(test, mockall::automock)]
pub trait BarcodeReader: Debug + Send + Sync {
    /// Reads the image at `path`.
    ///
    /// Not finding a barcode is not an error, it is reported as a
    /// [`ScanResult`] without a barcode. Errors are reserved for files that
    /// cannot be opened or decoded as images.
    fn read(&self, path: &Path) -> eyre::Result<ScanResult>;
}

/// Multi-format reader covering the 1-D and 2-D symbologies rxing knows.
#[derive(Debug, Default)]
pub struct RxingReader;

impl RxingReader {
    fn detect(image: &DynamicImage) -> Option<String> {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        // `detect_in_luma` hands height and width to the source swapped.
        let mut hints = DecodingHintDictionary::default();
        match rxing::helpers::detect_in_luma_with_hints(
            luma.into_raw(),
            width,
            height,
            None,
            &mut hints,
        ) {
            Ok(result) => {
                tracing::debug!(format = ?result.getBarcodeFormat(), "found barcode");
                Some(result.getText().to_string())
            }
            Err(err) => {
                tracing::debug!("no barcode detected: {err}");
                None
            }
        }
    }
}

impl BarcodeReader for RxingReader {
    #[tracing::instrument(skip(self))]
    fn read(&self, path: &Path) -> eyre::Result<ScanResult> {
        let image = image::open(path)?;

        tracing::trace!(width = image.width(), height = image.height(), "opened image");

        match Self::detect(&image) {
            Some(barcode) => Ok(ScanResult {
                barcode: Some(barcode),
                image: Some(image),
            }),
            None => Ok(ScanResult::not_found(image)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{GrayImage, Luma};
    use rxing::{BarcodeFormat, MultiFormatWriter, Writer};

    use super::*;

    /// Renders `contents` as a barcode image file inside `dir`.
    pub(crate) fn write_barcode_image(
        dir: &Path,
        contents: &str,
        format: BarcodeFormat,
        width: i32,
        height: i32,
    ) -> std::path::PathBuf {
        let matrix = MultiFormatWriter::default()
            .encode(contents, &format, width, height)
            .expect("could not encode barcode");

        let image = GrayImage::from_fn(matrix.getWidth(), matrix.getHeight(), |x, y| {
            if matrix.get(x, y) {
                Luma([0])
            } else {
                Luma([255])
            }
        });

        let path = dir.join(format!("{contents}.png"));
        image.save(&path).expect("could not save barcode image");
        path
    }

    #[test]
    fn reads_qr_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_barcode_image(
            dir.path(),
            "3017620422003",
            BarcodeFormat::QR_CODE,
            300,
            300,
        );

        let result = RxingReader.read(&path).unwrap();
        assert_eq!(result.barcode.as_deref(), Some("3017620422003"));
        assert!(result.image.is_some());
    }

    #[test]
    fn reads_qr_code_on_wide_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let code = write_barcode_image(dir.path(), "hello-wide", BarcodeFormat::QR_CODE, 200, 200);
        let code = image::open(code).unwrap().to_luma8();

        let mut canvas = GrayImage::from_pixel(600, 300, Luma([255]));
        image::imageops::overlay(&mut canvas, &code, 50, 50);
        let path = dir.path().join("wide.png");
        canvas.save(&path).unwrap();

        let result = RxingReader.read(&path).unwrap();
        assert_eq!(result.barcode.as_deref(), Some("hello-wide"));
    }

    #[test]
    fn reads_qr_code_on_tall_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let code = write_barcode_image(dir.path(), "hello-tall", BarcodeFormat::QR_CODE, 200, 200);
        let code = image::open(code).unwrap().to_luma8();

        let mut canvas = GrayImage::from_pixel(300, 600, Luma([255]));
        image::imageops::overlay(&mut canvas, &code, 50, 350);
        let path = dir.path().join("tall.png");
        canvas.save(&path).unwrap();

        let result = RxingReader.read(&path).unwrap();
        assert_eq!(result.barcode.as_deref(), Some("hello-tall"));
    }

    #[test]
    fn reads_ean_13() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_barcode_image(
            dir.path(),
            "5449000000996",
            BarcodeFormat::EAN_13,
            400,
            150,
        );

        let result = RxingReader.read(&path).unwrap();
        assert_eq!(result.barcode.as_deref(), Some("5449000000996"));
    }

    #[test]
    fn blank_image_has_no_barcode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.png");
        GrayImage::from_pixel(120, 80, Luma([255]))
            .save(&path)
            .unwrap();

        let result = RxingReader.read(&path).unwrap();
        assert!(result.barcode.is_none());
        let image = result.image.expect("image should still be returned");
        assert_eq!((image.width(), image.height()), (120, 80));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RxingReader.read(&dir.path().join("nope.png")).is_err());
    }

    #[test]
    fn non_image_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(RxingReader.read(&path).is_err());
    }
}
