pub mod extractor;
pub mod jwt;
pub mod tenant;
pub mod test_utils;
