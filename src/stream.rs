//! Batch conversion: run many attempts concurrently, emit results as they
//! finish.
//!
//! Each item is an independent [`Converter::run_conversion`] call with its
//! own history entry, so one failed file never affects the others. Up to
//! [`crate::config::ConverterConfig::concurrency`] attempts are in flight at
//! once; items arrive in completion order, tagged with their input index.

use crate::convert::{ConversionOutput, Converter};
use crate::error::ConvertError;
use crate::formats::{Format, SourceFormat};
use crate::request::ConversionRequest;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// One finished attempt of a batch.
#[derive(Debug)]
pub struct BatchItem {
    /// Position of the input in the batch.
    pub index: usize,
    /// File name, path or URL identifying the input.
    pub label: String,
    pub result: Result<ConversionOutput, ConvertError>,
}

/// A boxed stream of batch items.
pub type ConversionStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Convert prepared requests concurrently.
pub fn convert_stream(converter: Arc<Converter>, requests: Vec<ConversionRequest>) -> ConversionStream {
    let concurrency = converter.config().concurrency;
    info!(
        "Starting batch of {} requests (concurrency {})",
        requests.len(),
        concurrency
    );

    let s = stream::iter(requests.into_iter().enumerate().map(move |(index, request)| {
        let converter = Arc::clone(&converter);
        async move {
            let label = request
                .file_name
                .clone()
                .unwrap_or_else(|| format!("request #{}", index + 1));
            let result = converter.run_conversion(request).await;
            BatchItem {
                index,
                label,
                result,
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}

/// Load and convert paths or URLs concurrently, all into `target`.
pub fn convert_inputs_stream(
    converter: Arc<Converter>,
    inputs: Vec<String>,
    target: Format,
    source: Option<SourceFormat>,
) -> ConversionStream {
    let concurrency = converter.config().concurrency;
    info!(
        "Starting batch of {} inputs → {} (concurrency {})",
        inputs.len(),
        target,
        concurrency
    );

    let s = stream::iter(inputs.into_iter().enumerate().map(move |(index, input)| {
        let converter = Arc::clone(&converter);
        async move {
            let result = converter.convert_input(&input, target, source).await;
            BatchItem {
                index,
                label: input,
                result,
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
