use crate::{
    constants::CATALOG_DATE_FORMAT,
    error::{Result, SamplerError},
    geometry::Footprint,
};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};

/// Sensor-specific search constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorFilter {
    Optical { max_cloud_percent: u8 },
    Sar { product_type: String },
}

impl SensorFilter {
    fn to_json(&self) -> Value {
        match self {
            SensorFilter::Optical { max_cloud_percent } => json!({
                "type": "Optical",
                "maxCloudPercent": max_cloud_percent,
            }),
            SensorFilter::Sar { product_type } => json!({
                "type": "SAR",
                "sarProductType": product_type,
            }),
        }
    }
}

/// Acquisition date range for catalog searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// `days` back from now.
    pub fn lookback(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub footprint_wkt: String,
    pub window: DateWindow,
    pub filter: SensorFilter,
}

impl CatalogQuery {
    pub fn new(footprint: &Footprint, window: DateWindow, filter: SensorFilter) -> Self {
        Self {
            footprint_wkt: footprint.to_wkt(),
            window,
            filter,
        }
    }
}

/// Remote tile catalog: footprint query → candidate tile keys, best first.
pub trait TileCatalog: Send + Sync {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(rename = "supplierId")]
    supplier_id: String,
}

/// JSON search endpoint at `<base_url>/search`.
pub struct HttpCatalog {
    client: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalog {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = HttpClient::builder()
            .user_agent(concat!("tile_sampler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request_body(query: &CatalogQuery) -> Value {
        json!({
            "aoi": query.footprint_wkt,
            "start": query.window.start.format(CATALOG_DATE_FORMAT).to_string(),
            "stop": query.window.end.format(CATALOG_DATE_FORMAT).to_string(),
            "sensorFilters": query.filter.to_json(),
        })
    }
}

impl TileCatalog for HttpCatalog {
    fn search(&self, query: &CatalogQuery) -> Result<Vec<String>> {
        let url = format!("{}/search", self.base_url);
        let mut request = self.client.post(&url).json(&Self::request_body(query));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SamplerError::Catalog(format!(
                "search returned HTTP {status} for {}",
                query.footprint_wkt
            )));
        }
        let body: SearchResponse = response.json()?;
        debug!("Catalog returned {} products", body.products.len());
        Ok(body.products.into_iter().map(|p| p.supplier_id).collect())
    }
}
