use std::{borrow::Cow, fmt::Debug, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigLoaderObject;

/// A single nutrient value from a product record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nutrient {
    /// The value as reported by the database, formatted as it appeared.
    Reported(String),
    NotAvailable,
}

impl Nutrient {
    fn from_value(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => Self::NotAvailable,
            Some(serde_json::Value::String(value)) => Self::Reported(value.clone()),
            Some(value) => Self::Reported(value.to_string()),
        }
    }
}

impl std::fmt::Display for Nutrient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reported(value) => write!(f, "{value}"),
            Self::NotAvailable => write!(f, "N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NutritionRecord {
    /// Name entered by the user, not the database's product name.
    pub product_name: String,
    pub barcode: String,
    pub proteins: Nutrient,
    pub calories: Nutrient,
    pub sugar: Nutrient,
    /// The complete `nutriments` object, if the product had one.
    pub nutriments: Option<serde_json::Value>,
}

impl NutritionRecord {
    fn from_product(barcode: &str, product_name: &str, product: Product) -> Self {
        let nutriments = product.nutriments.filter(|value| !value.is_null());
        let field = |name: &str| {
            Nutrient::from_value(nutriments.as_ref().and_then(|value| value.get(name)))
        };

        Self {
            product_name: product_name.to_string(),
            barcode: barcode.to_string(),
            proteins: field("proteins"),
            calories: field("energy-kcal_100g"),
            sugar: field("sugars_100g"),
            nutriments,
        }
    }
}

impl std::fmt::Display for NutritionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Product: {}\nProteins: {}\nCalories: {}\nSugar: {}",
            self.product_name, self.proteins, self.calories, self.sugar
        )
    }
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    product: Option<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(default)]
    nutriments: Option<serde_json::Value>,
}

/// Looks up nutrition facts for a barcode.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NutritionLookup: Debug + Send + Sync {
    /// Returns `Ok(None)` when the service has no usable record for the
    /// barcode. Errors mean the service could not be reached or answered
    /// with something unreadable.
    async fn lookup(
        &self,
        barcode: &str,
        product_name: &str,
    ) -> eyre::Result<Option<NutritionRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            base_url: OpenFoodFacts::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

impl ConfigLoaderObject for LookupSettings {
    fn key(&self) -> Cow<'static, str> {
        "lookup".into()
    }

    fn save(&self) -> eyre::Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    fn restore(&mut self, value: serde_json::Value) -> eyre::Result<()> {
        *self = serde_json::from_value(value)?;
        Ok(())
    }
}

/// Client for the Open Food Facts product API.
#[derive(Debug, Clone)]
pub struct OpenFoodFacts {
    client: reqwest::Client,
    base_url: Url,
}

impl OpenFoodFacts {
    pub const DEFAULT_BASE_URL: &'static str = "https://world.openfoodfacts.org";

    pub fn new(settings: &LookupSettings) -> eyre::Result<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        eyre::ensure!(
            matches!(base_url.scheme(), "http" | "https"),
            "lookup service must be an http or https url"
        );

        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn product_url(&self, barcode: &str) -> eyre::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| eyre::eyre!("lookup service url cannot have a path"))?
            .pop_if_empty()
            .extend(["api", "v0", "product", &format!("{barcode}.json")]);

        Ok(url)
    }
}

#[async_trait]
impl NutritionLookup for OpenFoodFacts {
    #[tracing::instrument(skip(self))]
    async fn lookup(
        &self,
        barcode: &str,
        product_name: &str,
    ) -> eyre::Result<Option<NutritionRecord>> {
        let url = self.product_url(barcode)?;
        tracing::debug!(%url, "requesting product");

        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(%status, "lookup was not successful");
            return Ok(None);
        }

        let data: ProductResponse = resp.json().await?;

        let Some(product) = data.product else {
            tracing::debug!("response had no product");
            return Ok(None);
        };

        let record = NutritionRecord::from_product(barcode, product_name, product);
        tracing::info!("found nutrition record");

        Ok(Some(record))
    }
}
