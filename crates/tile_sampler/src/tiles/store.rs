use crate::error::{Result, SamplerError};
use log::{debug, info};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

/// Bulk imagery store: materializes one tile under `tile_dir/<tile_key>/`.
pub trait ImageryStore: Send + Sync {
    fn fetch(&self, tile_key: &str, tile_dir: &Path) -> Result<PathBuf>;
}

/// Object prefix of a Sentinel-2 product inside the public bucket.
///
/// The sixth `_` field of the supplier id is the MGRS tile (`T31UFT`), split into
/// `31/U/FT`.
pub fn object_prefix(supplier_id: &str) -> Result<String> {
    let mgrs = supplier_id
        .split('_')
        .nth(5)
        .filter(|s| s.len() >= 6 && s.is_ascii())
        .ok_or_else(|| SamplerError::Download {
            tile: supplier_id.to_string(),
            message: "supplier id has no MGRS tile field".to_string(),
        })?;
    Ok(format!(
        "tiles/{}/{}/{}/{}.SAFE",
        &mgrs[1..3],
        &mgrs[3..4],
        &mgrs[4..6],
        supplier_id
    ))
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

/// Public cloud bucket of full Sentinel-2 products, read through its JSON listing API.
pub struct BucketStore {
    client: HttpClient,
    base_url: String,
    bucket: String,
}

impl BucketStore {
    pub fn new(base_url: &str, bucket: &str) -> Result<Self> {
        let client = HttpClient::builder()
            .user_agent(concat!("tile_sampler/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        })
    }

    fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("prefix", prefix.to_string())];
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }
            let page: ObjectList = self
                .client
                .get(&url)
                .query(&params)
                .send()?
                .error_for_status()?
                .json()?;
            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(names)
    }

    fn download_object(&self, name: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/{}/{}", self.base_url, self.bucket, name);
        let mut response = self.client.get(&url).send()?.error_for_status()?;
        let mut file = File::create(dest)?;
        response.copy_to(&mut file)?;
        Ok(())
    }
}

impl ImageryStore for BucketStore {
    fn fetch(&self, tile_key: &str, tile_dir: &Path) -> Result<PathBuf> {
        let prefix = object_prefix(tile_key)?;
        let dest_dir = tile_dir.join(tile_key);
        fs::create_dir_all(tile_dir)?;
        // dot-prefixed so an interrupted download is never mistaken for a tile
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{tile_key}-"))
            .tempdir_in(tile_dir)?;

        let objects = self.list_objects(&prefix)?;
        if objects.is_empty() {
            return Err(SamplerError::Download {
                tile: tile_key.to_string(),
                message: format!("no objects under {prefix}"),
            });
        }

        for name in objects.iter().filter(|n| !n.ends_with('/')) {
            let Some(file_name) = Path::new(name).file_name() else {
                continue;
            };
            debug!("Downloading {name}");
            self.download_object(name, &staging.path().join(file_name))?;
        }
        if dest_dir.exists() {
            fs::remove_dir_all(&dest_dir)?;
        }
        fs::rename(staging.path(), &dest_dir)?;
        info!("Downloaded tile {tile_key} ({} objects)", objects.len());
        Ok(dest_dir)
    }
}
