pub mod color;
pub mod extractor;
pub mod mask;
pub mod regions;
pub mod traits;
pub mod validity;
