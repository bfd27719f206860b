//! `futures_core::Stream` adapter: frames in, envelopes out.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use tframe_frame::{Frame, FrameError};

use crate::codec::MessageCodec;
use crate::envelope::MessageEnvelope;
use crate::error::PipelineError;
use crate::stage::ForwardingStage;

/// Runs every frame of `S` through a [`ForwardingStage`].
///
/// Typically `S` is a `FramedRead<_, FrameCodec>`. Frames the codec rejects
/// are skipped; reassembly errors are yielded and the stream ends with them.
/// Closing the stage ends the stream before the next frame is pulled.
pub struct ForwardingStream<S, C> {
    inner: S,
    stage: ForwardingStage<C>,
    done: bool,
}

impl<S, C> ForwardingStream<S, C>
where
    S: Stream<Item = Result<Frame, FrameError>> + Unpin,
    C: MessageCodec,
{
    pub fn new(inner: S, stage: ForwardingStage<C>) -> Self {
        Self {
            inner,
            stage,
            done: false,
        }
    }

    pub fn stage(&self) -> &ForwardingStage<C> {
        &self.stage
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, C> Stream for ForwardingStream<S, C>
where
    S: Stream<Item = Result<Frame, FrameError>> + Unpin,
    C: MessageCodec + Unpin,
{
    type Item = Result<MessageEnvelope<C::Message>, PipelineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done || this.stage.is_closed() {
            this.done = true;
            return Poll::Ready(None);
        }

        loop {
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(frame)) => {
                    let mut emitted = None;
                    this.stage.forward(&frame, |env| emitted = Some(env));
                    if let Some(env) = emitted {
                        return Poll::Ready(Some(Ok(env)));
                    }
                }
                Some(Err(err)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err.into())));
                }
                None => {
                    this.done = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}
