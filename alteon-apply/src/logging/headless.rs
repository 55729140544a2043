use super::Frontend;
use anyhow::Result;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format::FmtSpan, Layer as FmtLayer},
    layer::SubscriberExt as _,
    Layer as _, Registry,
};

/// Plain log lines on stderr.
///
/// stdout is reserved for the outcome or failure document of `apply`, which
/// callers parse as JSON, so nothing else may be written there. The
/// invocation span is only announced with `--verbose`; otherwise a run that
/// changes nothing stays silent.
pub(crate) struct HeadlessLogger {}

/// Level and span events for the given verbosity.
fn verbosity(verbose: bool) -> (LevelFilter, FmtSpan) {
    if verbose {
        // include enter/exit events for detailed tracing
        (LevelFilter::TRACE, FmtSpan::FULL)
    } else {
        (LevelFilter::INFO, FmtSpan::NONE)
    }
}

impl Frontend for HeadlessLogger {
    fn set_up(&mut self, options: &super::Options) -> Result<()> {
        if options.verbose {
            eprintln!("setting up verbose logging");
        }
        let (filter, span_events) = verbosity(options.verbose);

        let fmt_layer = FmtLayer::new()
            .with_writer(std::io::stderr)
            .with_span_events(span_events)
            .with_ansi(options.color)
            .with_filter(filter);
        let subscriber = Registry::default().with(fmt_layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))?;

        Ok(())
    }

    fn tear_down(&mut self) -> Result<()> {
        Ok(())
    }
}
