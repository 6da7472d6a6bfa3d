pub(crate) mod embedding;
pub(crate) mod rasterize;
pub(crate) mod scoring;
pub(crate) mod storage;
