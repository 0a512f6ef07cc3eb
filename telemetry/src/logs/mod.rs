//! Structured log buffering and shipping.

mod buffer;
mod shipper;
mod stream;

pub use buffer::LogBuffer;
pub use shipper::{FlushOutcome, HttpRequestLog, LogShipper};
pub use stream::{LogPush, LogStream, StreamLabels};
