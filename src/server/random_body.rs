//! Response body of fresh random bytes for the download route.

use crate::random::random_bytes;
use hyper::body::{Body, Bytes, Frame, SizeHint};
use log::trace;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A body that streams `remaining` fresh random bytes, `chunk_size` at a
/// time, and ends.
///
/// Between chunks it returns `Pending` once (after waking itself) so that a
/// large download cannot monopolise the worker it runs on. If the client
/// goes away, hyper drops the body and generation stops.
#[derive(Debug)]
pub struct RandomBody {
    remaining: u64,
    chunk_size: usize,
    yield_next: bool,
}

impl RandomBody {
    pub fn new(size: u64, chunk_size: usize) -> Self {
        RandomBody { remaining: size, chunk_size: chunk_size.max(1), yield_next: false }
    }
}

impl Body for RandomBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }

        if self.yield_next {
            self.yield_next = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        let len = self.remaining.min(self.chunk_size as u64) as usize;
        self.remaining -= len as u64;
        self.yield_next = true;

        trace!("random body frame: len={}, remaining={}", len, self.remaining);

        Poll::Ready(Some(Ok(Frame::data(random_bytes(len)))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining == 0
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining)
    }
}
