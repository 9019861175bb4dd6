//! GeoJSON to WKT conversion for spatial operator values.

use serde_json::Value;

use crate::error::{Error, Result};

/// Accepts a WKT string (passed through) or a GeoJSON geometry / feature
/// object and returns WKT text suitable for `ST_GeomFromText`.
pub fn to_wkt(value: &Value) -> Result<String> {
    match value {
        Value::String(wkt) if !wkt.trim().is_empty() => Ok(wkt.trim().to_string()),
        Value::String(_) => Err(Error::InvalidGeometry("empty geometry".into())),
        Value::Object(map) => {
            let kind = map
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidGeometry("missing \"type\"".into()))?;

            match kind {
                "Feature" => map
                    .get("geometry")
                    .ok_or_else(|| Error::InvalidGeometry("feature without geometry".into()))
                    .and_then(to_wkt),
                "GeometryCollection" => {
                    let members = map
                        .get("geometries")
                        .and_then(Value::as_array)
                        .ok_or_else(|| Error::InvalidGeometry("missing \"geometries\"".into()))?;
                    let parts = members.iter().map(to_wkt).collect::<Result<Vec<_>>>()?;
                    Ok(format!("GEOMETRYCOLLECTION({})", parts.join(", ")))
                }
                _ => {
                    let coordinates = map
                        .get("coordinates")
                        .ok_or_else(|| Error::InvalidGeometry("missing \"coordinates\"".into()))?;
                    geometry_wkt(kind, coordinates)
                }
            }
        }
        other => Err(Error::InvalidGeometry(format!("unsupported value {}", other))),
    }
}

fn geometry_wkt(kind: &str, coordinates: &Value) -> Result<String> {
    match kind {
        "Point" => Ok(format!("POINT({})", position(coordinates)?)),
        "LineString" => Ok(format!("LINESTRING{}", ring(coordinates)?)),
        "Polygon" => Ok(format!("POLYGON{}", rings(coordinates)?)),
        "MultiPoint" => Ok(format!("MULTIPOINT{}", ring(coordinates)?)),
        "MultiLineString" => Ok(format!("MULTILINESTRING{}", rings(coordinates)?)),
        "MultiPolygon" => {
            let polygons = array(coordinates)?
                .iter()
                .map(rings)
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("MULTIPOLYGON({})", polygons.join(", ")))
        }
        other => Err(Error::InvalidGeometry(format!("unknown type \"{}\"", other))),
    }
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::InvalidGeometry(format!("expected array, got {}", value)))
}

fn position(value: &Value) -> Result<String> {
    let coords = array(value)?;
    if coords.len() < 2 {
        return Err(Error::InvalidGeometry(format!("position {} needs two coordinates", value)));
    }
    coords
        .iter()
        .map(|c| {
            c.as_f64()
                .map(|_| c.to_string())
                .ok_or_else(|| Error::InvalidGeometry(format!("coordinate {} is not a number", c)))
        })
        .collect::<Result<Vec<_>>>()
        .map(|parts| parts.join(" "))
}

// (x y, x y, ...)
fn ring(value: &Value) -> Result<String> {
    let positions = array(value)?
        .iter()
        .map(position)
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", positions.join(", ")))
}

// ((x y, ...), (x y, ...))
fn rings(value: &Value) -> Result<String> {
    let parts = array(value)?.iter().map(ring).collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_and_polygon() {
        assert_eq!(
            to_wkt(&json!({"type": "Point", "coordinates": [30, 10]})).unwrap(),
            "POINT(30 10)"
        );
        assert_eq!(
            to_wkt(&json!({
                "type": "Polygon",
                "coordinates": [[[30, 10], [40, 40], [20, 40], [30, 10]]]
            }))
            .unwrap(),
            "POLYGON((30 10, 40 40, 20 40, 30 10))"
        );
    }

    #[test]
    fn test_multipolygon_and_feature() {
        let wkt = to_wkt(&json!({
            "type": "Feature",
            "geometry": {
                "type": "MultiPolygon",
                "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]], [[[5, 5], [6, 5], [6, 6], [5, 5]]]]
            }
        }))
        .unwrap();
        assert_eq!(
            wkt,
            "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))"
        );
    }

    #[test]
    fn test_wkt_passthrough_and_errors() {
        assert_eq!(to_wkt(&json!("POINT(1 2)")).unwrap(), "POINT(1 2)");
        assert!(to_wkt(&json!({"type": "Point"})).is_err());
        assert!(to_wkt(&json!({"type": "Point", "coordinates": ["a", 1]})).is_err());
        assert!(to_wkt(&json!(12)).is_err());
    }
}
