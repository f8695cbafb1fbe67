use {
    futures::future::FusedFuture,
    pin_project_lite::pin_project,
    std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
        time::Instant,
    },
};

/// Extension trait to record how long a future takes from its first poll
/// until it resolves.
pub trait Measure: Sized {
    fn measure(self, label: &'static str) -> Measured<Self> {
        Measured {
            inner: self,
            label,
            started: None,
            done: false,
        }
    }
}

impl<T: Future> Measure for T {}

pin_project! {
    /// A future whose execution time is observed in the
    /// `future_execution_seconds` histogram under its label. Futures that get
    /// dropped before completing are not recorded.
    #[derive(Debug)]
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Measured<T> {
        #[pin]
        inner: T,
        label: &'static str,
        started: Option<Instant>,
        done: bool,
    }
}

impl<T: Future> Future for Measured<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let started = *this.started.get_or_insert_with(Instant::now);
        let result = this.inner.poll(cx);
        if result.is_ready() {
            *this.done = true;
            Metrics::get()
                .future_execution_seconds
                .with_label_values(&[this.label])
                .observe(started.elapsed().as_secs_f64());
        }
        result
    }
}

impl<T: Future> FusedFuture for Measured<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Execution time of measured futures.
    #[metric(labels("label"))]
    future_execution_seconds: prometheus::HistogramVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(super::metrics::get_storage_registry())
            .expect("unexpected error getting metrics instance")
    }
}
