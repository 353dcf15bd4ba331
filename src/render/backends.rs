pub mod null;
pub mod software;
