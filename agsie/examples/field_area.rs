use agsie::geo_core::{validate, RawGeometry};
use agsie::geometric::area::AreaCalculator;
use anyhow::Result;

/// Example: geodesic area of a field read from GeoJSON, next to the legacy
/// planar figure older records were stored with. No network access needed.
fn main() -> Result<()> {
    let geojson: geojson::Geometry = r#"{"type": "Polygon", "coordinates": [[
        [3.0, 43.0], [3.00123, 43.0], [3.00123, 43.0009], [3.0, 43.0009], [3.0, 43.0]
    ]]}"#
        .parse::<geojson::GeoJson>()?
        .try_into()?;

    let field = validate(&RawGeometry::try_from(&geojson)?)?;
    println!("Bounding box: {:?}", field.bounding_box().to_stac_bbox());

    let geodesic = AreaCalculator::geodesic().compute(&field)?;
    let legacy = AreaCalculator::legacy_planar().compute(&field)?;
    println!("Geodesic area: {:.4} ha", geodesic.hectares);
    println!("Legacy planar area: {:.4} ha", legacy.hectares);

    Ok(())
}
