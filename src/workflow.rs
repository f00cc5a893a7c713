use std::{path::PathBuf, sync::Arc};

use image::{DynamicImage, RgbaImage};

use crate::{
    barcode::BarcodeReader,
    nutrition::{NutritionLookup, NutritionRecord},
};

/// Longest side, in pixels, of the thumbnail shown next to a result.
pub const THUMBNAIL_MAX_SIDE: u32 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Decoding,
    LookingUp,
    Displaying,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Ready"),
            Self::Decoding => write!(f, "Decoding barcode…"),
            Self::LookingUp => write!(f, "Looking up nutrition facts…"),
            Self::Displaying => write!(f, "Done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub image_path: PathBuf,
    pub product_name: String,
}

/// Reasons a request ends without a nutrition record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    MissingProductName,
    UnreadableImage(String),
    NoBarcode,
    NoNutritionInfo,
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingProductName => write!(f, "Please enter the product name."),
            Self::UnreadableImage(reason) => write!(f, "Could not open the image: {reason}"),
            Self::NoBarcode => write!(f, "No barcode detected in the image."),
            Self::NoNutritionInfo => {
                write!(f, "No nutritional information found for this product.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Found {
    pub record: NutritionRecord,
    pub thumbnail: Option<RgbaImage>,
}

/// What the interface should show once a request finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Render {
    pub text: String,
    pub thumbnail: Option<RgbaImage>,
    pub record: Option<NutritionRecord>,
}

impl Render {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thumbnail: None,
            record: None,
        }
    }
}

impl From<Result<Found, ProcessError>> for Render {
    fn from(result: Result<Found, ProcessError>) -> Self {
        match result {
            Ok(Found { record, thumbnail }) => Self {
                text: record.to_string(),
                thumbnail,
                record: Some(record),
            },
            Err(err) => Self::message(err.to_string()),
        }
    }
}

/// Dimensions fitting `width` by `height` within `max_side`, keeping the
/// aspect ratio. Images already within bounds are left as they are.
pub fn thumbnail_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side {
        return (width, height);
    }

    let scale = f64::from(max_side) / f64::from(longest);
    let fit = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_side);

    (fit(width), fit(height))
}

pub fn thumbnail(image: &DynamicImage, max_side: u32) -> RgbaImage {
    let (width, height) = thumbnail_size(image.width(), image.height(), max_side);

    if (width, height) == (image.width(), image.height()) {
        image.to_rgba8()
    } else {
        image.thumbnail_exact(width, height).to_rgba8()
    }
}

/// Runs the decode, lookup, render sequence for one request.
#[derive(Debug, Clone)]
pub struct Workflow {
    reader: Arc<dyn BarcodeReader>,
    lookup: Arc<dyn NutritionLookup>,
}

impl Workflow {
    pub fn new(reader: Arc<dyn BarcodeReader>, lookup: Arc<dyn NutritionLookup>) -> Self {
        Self { reader, lookup }
    }

    /// Same reader, different lookup service.
    pub fn with_lookup(&self, lookup: Arc<dyn NutritionLookup>) -> Self {
        Self {
            reader: self.reader.clone(),
            lookup,
        }
    }

    #[tracing::instrument(skip_all, fields(path = %request.image_path.display()))]
    pub async fn process<F>(&self, request: ProcessRequest, on_stage: F) -> Result<Found, ProcessError>
    where
        F: Fn(Stage) + Send + Sync,
    {
        let product_name = request.product_name.as_str();
        if product_name.is_empty() {
            return Err(ProcessError::MissingProductName);
        }

        on_stage(Stage::Decoding);

        let reader = self.reader.clone();
        let path = request.image_path.clone();
        let (barcode, thumbnail) = tokio::task::spawn_blocking(move || {
            let scan = reader.read(&path)?;

            let thumbnail = match (&scan.barcode, &scan.image) {
                (Some(_), Some(image)) => Some(thumbnail(image, THUMBNAIL_MAX_SIDE)),
                _ => None,
            };

            Ok::<_, eyre::Report>((scan.barcode, thumbnail))
        })
        .await
        .map_err(|err| ProcessError::UnreadableImage(err.to_string()))?
        .map_err(|err| {
            tracing::warn!("could not read image: {err}");
            ProcessError::UnreadableImage(err.to_string())
        })?;

        let Some(barcode) = barcode else {
            tracing::info!("no barcode in image");
            return Err(ProcessError::NoBarcode);
        };

        tracing::debug!(%barcode, "decoded barcode");
        on_stage(Stage::LookingUp);

        let record = match self.lookup.lookup(&barcode, product_name).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(%barcode, "no record for barcode");
                return Err(ProcessError::NoNutritionInfo);
            }
            Err(err) => {
                tracing::warn!(%barcode, "lookup failed: {err}");
                return Err(ProcessError::NoNutritionInfo);
            }
        };

        on_stage(Stage::Displaying);

        Ok(Found { record, thumbnail })
    }

    pub async fn render<F>(&self, request: ProcessRequest, on_stage: F) -> Render
    where
        F: Fn(Stage) + Send + Sync,
    {
        self.process(request, on_stage).await.into()
    }
}
