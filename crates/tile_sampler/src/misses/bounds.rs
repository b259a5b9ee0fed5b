use crate::{
    constants::INSPIRE_FILE,
    error::{Result, SamplerError},
};
use geo::{Coord, LineString, Polygon};
use std::{collections::HashMap, fs, path::PathBuf};

/// Resolves the ground footprint of a downloaded tile.
pub trait TileBoundsSource: Send + Sync {
    fn tile_area(&self, tile_key: &str) -> Result<Polygon<f64>>;
}

impl TileBoundsSource for HashMap<String, Polygon<f64>> {
    fn tile_area(&self, tile_key: &str) -> Result<Polygon<f64>> {
        self.get(tile_key).cloned().ok_or_else(|| SamplerError::TileBounds {
            tile: tile_key.to_string(),
            message: "unknown tile".to_string(),
        })
    }
}

const IDENTIFICATION_PATH: [&str; 2] = ["gmd:identificationInfo", "gmd:MD_DataIdentification"];
const ABSTRACT: &str = "gmd:abstract";
const TEXT: &str = "gco:CharacterString";

/// Reads `tile_dir/<key>/INSPIRE.xml` shipped with each Sentinel-2 product.
#[derive(Debug, Clone)]
pub struct InspireBounds {
    tile_dir: PathBuf,
}

impl InspireBounds {
    pub fn new(tile_dir: impl Into<PathBuf>) -> Self {
        Self {
            tile_dir: tile_dir.into(),
        }
    }
}

impl TileBoundsSource for InspireBounds {
    fn tile_area(&self, tile_key: &str) -> Result<Polygon<f64>> {
        let path = self.tile_dir.join(tile_key).join(INSPIRE_FILE);
        let xml = fs::read_to_string(&path).map_err(|e| SamplerError::TileBounds {
            tile: tile_key.to_string(),
            message: format!("{}: {e}", path.display()),
        })?;
        parse_inspire_polygon(&xml).map_err(|message| SamplerError::TileBounds {
            tile: tile_key.to_string(),
            message,
        })
    }
}

/// Content of the first `<name ...>...</name>` element in `xml`.
///
/// Start tags may carry attributes and whitespace. Namespace prefixes are matched
/// literally, and CDATA sections and entities are not decoded.
fn element_content<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}");
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&open) {
        let tag_start = from + pos;
        let rest = &xml[tag_start + open.len()..];
        from = tag_start + open.len();
        if !rest.starts_with(|c: char| c == '>' || c.is_whitespace()) {
            continue;
        }
        let body_start = tag_start + open.len() + rest.find('>')? + 1;
        let body_len = xml[body_start..].find(&format!("</{name}"))?;
        return Some(&xml[body_start..body_start + body_len]);
    }
    None
}

/// The text of `identificationInfo/MD_DataIdentification/abstract/CharacterString` is a
/// flat `lat lon lat lon ...` list. Files without the identification wrapper are searched
/// for the abstract directly.
pub fn parse_inspire_polygon(xml: &str) -> std::result::Result<Polygon<f64>, String> {
    let scope = IDENTIFICATION_PATH
        .iter()
        .fold(xml, |scope, name| element_content(scope, name).unwrap_or(scope));
    let abstract_body = element_content(scope, ABSTRACT).ok_or("no gmd:abstract element")?;
    let text = element_content(abstract_body, TEXT)
        .ok_or("gmd:abstract has no terminated gco:CharacterString")?;

    let values = text
        .split_whitespace()
        .map(|v| v.parse::<f64>().map_err(|e| format!("bad coordinate {v:?}: {e}")))
        .collect::<std::result::Result<Vec<f64>, String>>()?;
    if values.len() % 2 != 0 {
        return Err(format!("odd number of coordinates ({})", values.len()));
    }

    let coords: Vec<Coord<f64>> = values
        .chunks_exact(2)
        .map(|pair| Coord {
            x: pair[1],
            y: pair[0],
        })
        .collect();
    if coords.len() < 3 {
        return Err(format!("polygon needs 3 vertices, got {}", coords.len()));
    }
    Ok(Polygon::new(LineString::new(coords), vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::BoundingRect;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gmd:MD_Metadata xmlns:gmd="http://www.isotc211.org/2005/gmd" xmlns:gco="http://www.isotc211.org/2005/gco">
  <gmd:identificationInfo>
    <gmd:MD_DataIdentification>
      <gmd:citation><gco:CharacterString>S2B tile</gco:CharacterString></gmd:citation>
      <gmd:abstract>
        <gco:CharacterString>52.2 3.0 52.2 4.6 51.2 4.6 51.2 3.0 52.2 3.0</gco:CharacterString>
      </gmd:abstract>
    </gmd:MD_DataIdentification>
  </gmd:identificationInfo>
</gmd:MD_Metadata>"#;

    #[test]
    fn test_parse_swaps_to_lon_lat() {
        let poly = parse_inspire_polygon(SAMPLE).unwrap();
        let rect = poly.bounding_rect().unwrap();
        assert_eq!(rect.min().x, 3.0);
        assert_eq!(rect.max().x, 4.6);
        assert_eq!(rect.min().y, 51.2);
        assert_eq!(rect.max().y, 52.2);
    }

    #[test]
    fn test_parse_accepts_attributes_and_skips_other_abstracts() {
        let xml = r#"<gmd:MD_Metadata>
  <gmd:abstractNote><gco:CharacterString>not this</gco:CharacterString></gmd:abstractNote>
  <gmd:identificationInfo xlink:type="simple">
    <gmd:MD_DataIdentification id="tile">
      <gmd:abstract
          xml:lang="en"><gco:CharacterString codeSpace="x">10 20 10 21 11 21 11 20</gco:CharacterString></gmd:abstract>
    </gmd:MD_DataIdentification>
  </gmd:identificationInfo>
</gmd:MD_Metadata>"#;
        let rect = parse_inspire_polygon(xml).unwrap().bounding_rect().unwrap();
        assert_eq!((rect.min().x, rect.max().x), (20.0, 21.0));
        assert_eq!((rect.min().y, rect.max().y), (10.0, 11.0));
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(parse_inspire_polygon("<gmd:abstract></gmd:abstract>").is_err());
        assert!(
            parse_inspire_polygon(
                "<gmd:abstract><gco:CharacterString>1 2 3</gco:CharacterString></gmd:abstract>"
            )
            .is_err()
        );
        assert!(
            parse_inspire_polygon(
                "<gmd:abstract><gco:CharacterString>1 x 3 4</gco:CharacterString></gmd:abstract>"
            )
            .is_err()
        );
    }

    #[test]
    fn test_inspire_bounds_reads_tile_directory() {
        let dir = TempDir::new().unwrap();
        let tile = dir.path().join("S2B_TILE");
        fs::create_dir(&tile).unwrap();
        fs::write(tile.join(INSPIRE_FILE), SAMPLE).unwrap();

        let bounds = InspireBounds::new(dir.path());
        assert!(bounds.tile_area("S2B_TILE").is_ok());
        assert!(matches!(
            bounds.tile_area("S2B_MISSING"),
            Err(SamplerError::TileBounds { .. })
        ));
    }
}
