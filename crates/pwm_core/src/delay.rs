use std::{future::Future, time::Duration};

use tokio::time::sleep;

///Something that can wait. Hardware settling times are expressed through this so tests can skip them.
pub trait Delay {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;

    fn usleep(&self, micros: u64) -> impl Future<Output = ()> {
        self.sleep(Duration::from_micros(micros))
    }

    ///Negative, NaN or out of range waits return without waiting.
    fn sleep_secs(&self, seconds: f64) -> impl Future<Output = ()> {
        self.sleep(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO))
    }
}

///Waits on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        sleep(duration).await
    }
}
