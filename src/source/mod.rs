// Segment sources: where downloaded bytes come from.

pub mod http_source;
pub mod traits;
