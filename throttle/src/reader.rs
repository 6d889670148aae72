use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};

use crate::bucket::{Clock, Limiter, MonoClock};

/// Wraps a byte source so that reads never outpace the borrowed [`Limiter`].
///
/// Every read first reserves up to one burst worth of tokens and, if the bucket is in debt,
/// parks the task on a tokio timer for exactly the time needed. Bytes that were reserved but
/// not delivered are refunded.
pub struct ThrottledReader<'a, R, C: Clock = MonoClock> {
    inner: R,
    limiter: &'a mut Limiter<C>,
    scratch: Vec<u8>,
    reserved: usize,
    delay: Option<Pin<Box<tokio::time::Sleep>>>,
    bytes_read: u64,
}

impl<'a, R: AsyncRead + Unpin, C: Clock> ThrottledReader<'a, R, C> {
    pub fn new(inner: R, limiter: &'a mut Limiter<C>) -> Self {
        let scratch = vec![0; limiter.burst()];
        Self {
            inner,
            limiter,
            scratch,
            reserved: 0,
            delay: None,
            bytes_read: 0,
        }
    }

    /// Total number of bytes delivered so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: AsyncRead + Unpin, C: Clock> AsyncRead for ThrottledReader<'_, R, C> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            if let Some(delay) = this.delay.as_mut() {
                ready!(delay.as_mut().poll(cx));
                this.delay = None;
            }
            if this.reserved == 0 {
                let want = buf.remaining().min(this.scratch.len());
                if want == 0 {
                    return Poll::Ready(Ok(()));
                }
                let wait = this.limiter.reserve(want);
                this.reserved = want;
                if !wait.is_zero() {
                    this.delay = Some(Box::pin(tokio::time::sleep(wait)));
                    continue;
                }
            }
            // the reservation survives a Pending read and is reused on the next poll
            let reserved = this.reserved.min(buf.remaining());
            let mut chunk = ReadBuf::new(&mut this.scratch[..reserved]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk))?;
            let read = chunk.filled().len();
            buf.put_slice(chunk.filled());
            this.limiter.refund(this.reserved - read);
            this.reserved = 0;
            this.bytes_read += read as u64;
            return Poll::Ready(Ok(()));
        }
    }
}
