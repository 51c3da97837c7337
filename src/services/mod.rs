pub mod document_service;
pub mod image_cache;
pub mod image_extractor;
pub mod import_service;
pub mod pdf_composer;
pub mod workbook;
