//! The pool set owned by one connection.

use crate::body::{Body, ErrorResponse};
use crate::framing::Frame;
use crate::lazy::LazyFrame;
use crate::pool::{Pool, PoolRegistry, Pooled, Reset};

/// Per-connection pools for frames and pooled bodies.
///
/// Pools are created on first use and registered with this set's
/// [`PoolRegistry`] at that point.
#[derive(Debug, Default)]
pub struct FramePools {
    frames: Option<Pool<Frame>>,
    lazy_frames: Option<Pool<LazyFrame>>,
    error_responses: Option<Pool<ErrorResponse>>,
    registry: PoolRegistry,
}

fn lazily<'a, T: Default + Reset>(
    slot: &'a mut Option<Pool<T>>,
    registry: &mut PoolRegistry,
    name: &'static str,
) -> &'a mut Pool<T> {
    slot.get_or_insert_with(|| {
        let pool = Pool::with_reset(name);
        registry.register(&pool);
        pool
    })
}

impl FramePools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&mut self) -> &mut Pool<Frame> {
        lazily(&mut self.frames, &mut self.registry, "Frame")
    }

    pub fn lazy_frames(&mut self) -> &mut Pool<LazyFrame> {
        lazily(&mut self.lazy_frames, &mut self.registry, "LazyFrame")
    }

    pub fn error_responses(&mut self) -> &mut Pool<ErrorResponse> {
        lazily(&mut self.error_responses, &mut self.registry, "ErrorResponse")
    }

    /// Returns any pooled allocation held by `body`.
    pub fn free_body(&mut self, body: Body) {
        if let Body::ErrorResponse(mut res) = body {
            if !res.is_freed() {
                self.error_responses().free(&mut res);
            }
        }
    }

    /// Releases `frame` and then the body it carried.
    ///
    /// # Panics
    ///
    /// Panics if `frame` was already freed.
    pub fn free_frame(&mut self, frame: &mut Pooled<Frame>) {
        if !frame.is_freed() {
            if let Some(body) = frame.body.take() {
                self.free_body(body);
            }
        }
        self.frames().free(frame);
    }

    /// Releases `frame` and its cached body, if one was decoded.
    ///
    /// # Panics
    ///
    /// Panics if `frame` was already freed.
    pub fn free_lazy_frame(&mut self, frame: &mut Pooled<LazyFrame>) {
        if !frame.is_freed() {
            if let Some(body) = frame.take_body() {
                self.free_body(body);
            }
        }
        self.lazy_frames().free(frame);
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }
}
