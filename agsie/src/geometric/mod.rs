// Field measurement and imagery processing

pub mod area;
#[cfg(feature = "gdal")]
pub mod gdal_source;
pub mod health;
pub mod raster;
pub mod vegetation;

#[cfg(feature = "gdal")]
pub use gdal_source::GdalRasterSource;
