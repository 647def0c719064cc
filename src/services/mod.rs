pub mod batch;
pub mod export;
pub mod extraction;
pub mod ocr;
pub mod pool;
pub mod staging;
