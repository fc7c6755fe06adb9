pub mod errors;
pub mod loader;
pub mod quote;
pub mod report;

pub use errors::FrontendError;
pub use loader::{ExtractedDrawing, collect_drawings, extract_batch, load_app_config};
pub use quote::{
    QuoteReport, QuoteRequest, RejectedDrawing, quote_drawings, weigh_drawings, weigh_parsed,
};
pub use report::{OutputFormat, render_parse, render_quote};
