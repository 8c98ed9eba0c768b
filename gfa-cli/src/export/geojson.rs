//! Export des surfaces de plancher en GeoJSON (streaming avec geozero)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use gfa_engine::{EstimateStatus, Gfa, ParcelEstimate};

/// Exporte une feature par parcelle, avec une propriété `gfa_<programme>`
/// par programme estimé (`null` = inconnue).
pub fn export_to_geojson(
    estimates: &[ParcelEstimate],
    geometries: &HashMap<String, Geometry>,
    srid: u32,
    output_path: &Path,
) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        srid
    )?;

    for (i, estimate) in estimates.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(&mut writer, estimate, geometries.get(&estimate.parcel_id))?;
    }

    write!(writer, "]}}")?;
    writer.flush()?;

    Ok(())
}

fn write_feature<W: Write>(writer: &mut W, estimate: &ParcelEstimate, geometry: Option<&Geometry>) -> Result<()> {
    write!(
        writer,
        r#"{{"type":"Feature","id":"{}","#,
        escape_json(&estimate.parcel_id)
    )?;

    write!(writer, r#""geometry":"#)?;
    match geometry {
        Some(geometry) => {
            let mut geom_buf = Vec::new();
            let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
            geometry.process_geom(&mut geom_writer)?;
            writer.write_all(&geom_buf)?;
        }
        None => write!(writer, "null")?,
    }

    write!(
        writer,
        r#","properties":{{"parcel_id":"{}","zone":"{}","status":"{}","area":{},"max_gfa":{}"#,
        escape_json(&estimate.parcel_id),
        escape_json(&estimate.zone.to_string()),
        status_label(&estimate.status),
        number(estimate.area),
        number(estimate.max_gfa().value()),
    )?;
    for programme in &estimate.programmes {
        let value = match programme.gfa {
            Gfa::Known(v) => Some(v),
            Gfa::Unknown => None,
        };
        write!(
            writer,
            r#","gfa_{}":{}"#,
            escape_json(programme.programme.label()),
            number(value)
        )?;
    }
    write!(writer, "}}}}")?;

    Ok(())
}

fn status_label(status: &EstimateStatus) -> &'static str {
    match status {
        EstimateStatus::Estimated => "estimated",
        EstimateStatus::Unknown => "unknown",
        EstimateStatus::NonGfaZone => "non_gfa_zone",
        EstimateStatus::Unclear => "unclear",
        EstimateStatus::Excluded => "excluded",
    }
}

/// Nombre JSON arrondi au centième, `null` si absent
fn number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => "null".to_string(),
    }
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use gfa_engine::{Programme, ProgrammeEstimate, Zone};
    use std::io::Cursor;

    fn programme(programme: Programme, gfa: Gfa) -> ProgrammeEstimate {
        ProgrammeEstimate {
            programme,
            plot_ratio: None,
            site_coverage: 1.0,
            setbacks: Vec::new(),
            footprint_areas: Vec::new(),
            storeys: Vec::new(),
            gfa,
        }
    }

    fn estimate() -> ParcelEstimate {
        ParcelEstimate {
            parcel_id: "MK01-\"42\"".to_string(),
            zone: Zone::Residential,
            status: EstimateStatus::Estimated,
            area: Some(600.0),
            attributes: None,
            profile: None,
            parts: Vec::new(),
            programmes: vec![
                programme(Programme::Bungalow, Gfa::Known(720.5)),
                programme(Programme::Flat, Gfa::Unknown),
            ],
        }
    }

    #[test]
    fn test_write_feature() {
        let geometry = Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 20.0, y: 0.0), (x: 20.0, y: 30.0)]);
        let mut buffer = Cursor::new(Vec::new());
        write_feature(&mut buffer, &estimate(), Some(&geometry)).unwrap();

        let json = String::from_utf8(buffer.into_inner()).unwrap();
        assert!(json.contains(r#""id":"MK01-\"42\"""#));
        assert!(json.contains("Polygon"));
        assert!(json.contains(r#""gfa_Bungalow":720.50"#));
        assert!(json.contains(r#""gfa_Flat":null"#));
        assert!(json.contains(r#""max_gfa":720.50"#));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["properties"]["status"], "estimated");
    }

    #[test]
    fn test_missing_geometry_is_null() {
        let mut buffer = Cursor::new(Vec::new());
        write_feature(&mut buffer, &estimate(), None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer.into_inner()).unwrap();
        assert!(value["geometry"].is_null());
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("hello"), "hello");
        assert_eq!(escape_json("hello\"world"), "hello\\\"world");
        assert_eq!(escape_json("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn test_export_to_geojson() {
        let geometries: HashMap<String, Geometry> = HashMap::new();
        let output_path = std::env::temp_dir().join("gfa_cli_export_test.geojson");

        export_to_geojson(&[estimate()], &geometries, 3857, &output_path).unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert!(content.contains("EPSG::3857"));
        assert_eq!(value["features"].as_array().unwrap().len(), 1);

        std::fs::remove_file(output_path).ok();
    }
}
