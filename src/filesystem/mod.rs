//! Local files: downloaded blobs and unpacked layers

pub mod storage;
pub mod tar;
