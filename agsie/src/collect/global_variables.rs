/// Element84 Earth Search STAC API (public Sentinel-2 L2A COGs on AWS)
pub const STAC_URL: &str = "https://earth-search.aws.element84.com/v1/search";

pub const SENTINEL2_COLLECTION: &str = "sentinel-2-l2a";

/// Asset keys of the red (B04) and near-infrared (B08) bands
pub const RED_ASSET: &str = "B04";
pub const NIR_ASSET: &str = "B08";

/// STAC common-name aliases used by newer Earth Search items
pub const RED_ASSET_ALIAS: &str = "red";
pub const NIR_ASSET_ALIAS: &str = "nir";

/// STAC property the catalog sorts on
pub const DATETIME_PROPERTY: &str = "properties.datetime";

pub const NDVI_DECIMALS: u32 = 4;

/// Prefix handing an https href to GDAL's network reader
pub const VSICURL_PREFIX: &str = "/vsicurl/";
