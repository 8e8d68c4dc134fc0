pub mod data;
pub mod decode;
pub mod labels;
pub mod raster;
pub mod sequence;
pub mod viz;
