//! Outbound call responses.
//!
//! [`ResponseCore`] owns the state machine and the primitive frame send:
//! it fragments argument parts into call-response frames, applies outbound
//! credits, and emits exactly one terminal event per response.
//! [`StreamingOutResponse`] wraps a core with an [`OutArgStream`] and forwards
//! the stream's events into it.
//!
//! Frames leave through an unbounded channel of [`Frame`]s; lifecycle
//! notifications leave through a second channel of [`ResponseEvent`]s.

use bytes::Bytes;
use skein_core::body::{flags, CallCont, CallResponse, Checksum, ErrorResponse};
use skein_core::error::{ErrorCode, FrameError};
use skein_core::span::{Span, Tracing, SERVER_SEND, TRACING_SIZE};
use skein_core::{Body, CreditTracker, Frame};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::argstream::{ArgEvent, ArgIndex, ArgStreamError, OutArgStream};
use crate::config::ResponseConfig;
use crate::error::{ResponseError, Result};
use crate::state::ResponseState;

/// Lifecycle notifications of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// An error frame replaced the normal completion.
    Errored { code: ErrorCode, message: String },
    /// The response reached a terminal state. Always the last event.
    Finished,
    /// The argument stream rejected a write or end.
    ArgError(ArgStreamError),
}

// flags + checksum type
const CONT_PREAMBLE: usize = 2;
// length prefix of one argument chunk
const CHUNK_PREFIX: usize = 2;

pub struct ResponseCore {
    id: u32,
    state: ResponseState,
    code: u8,
    config: ResponseConfig,
    span: Option<Box<dyn Span>>,
    credits: Option<CreditTracker>,
    backlog: VecDeque<Frame>,
    finished: bool,
    frames: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedSender<ResponseEvent>,
}

impl std::fmt::Debug for ResponseCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCore")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("code", &self.code)
            .field("backlog", &self.backlog.len())
            .finish()
    }
}

impl ResponseCore {
    pub fn new(
        id: u32,
        config: ResponseConfig,
        frames: mpsc::UnboundedSender<Frame>,
        events: mpsc::UnboundedSender<ResponseEvent>,
    ) -> Result<Self> {
        config.validate()?;
        let credits = config.initial_credits.map(CreditTracker::new);
        Ok(Self {
            id,
            state: ResponseState::Initial,
            code: CallResponse::OK,
            config,
            span: None,
            credits,
            backlog: VecDeque::new(),
            finished: false,
            frames,
            events,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Status sent in the first call-response frame.
    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn set_span(&mut self, span: Box<dyn Span>) {
        self.span = Some(span);
    }

    /// Shares a connection-wide credit counter instead of a private one.
    pub fn set_credits(&mut self, credits: CreditTracker) {
        self.credits = Some(credits);
    }

    /// Sets the status; only meaningful before the first frame goes out.
    pub fn set_ok(&mut self, ok: bool) -> Result<()> {
        if self.state != ResponseState::Initial {
            return Err(ResponseError::AlreadyStarted { state: self.state });
        }
        self.code = if ok {
            CallResponse::OK
        } else {
            CallResponse::NOT_OK
        };
        Ok(())
    }

    pub fn ensure_open(&self, attempted: &str) -> Result<()> {
        if self.state.is_terminal() {
            return Err(ResponseError::AlreadyDone {
                attempted: attempted.to_string(),
            });
        }
        Ok(())
    }

    /// False while frames wait for credit.
    pub fn is_writable(&self) -> bool {
        match &self.credits {
            Some(credits) => self.backlog.is_empty() && credits.available() > 0,
            None => true,
        }
    }

    /// Frames held back for lack of credit.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn tracing(&self) -> Tracing {
        self.span
            .as_ref()
            .map(|span| span.tracing())
            .unwrap_or_default()
    }

    /// Sends one batch of argument parts as one or more frames.
    pub fn send_parts(&mut self, parts: Vec<Bytes>, is_last: bool) -> Result<()> {
        self.ensure_open("send call response frame")?;
        let opening = self.state == ResponseState::Initial;
        let frames = self.fragment(parts, is_last, opening)?;

        if opening {
            self.state = ResponseState::Started;
            if let Some(span) = self.span.as_mut() {
                span.annotate(SERVER_SEND);
            }
            trace!(id = self.id, code = self.code, "response started");
        }
        for frame in frames {
            if let Err(err) = self.enqueue(frame) {
                self.fail_transport();
                return Err(err);
            }
        }
        if is_last {
            self.state = ResponseState::Done;
            debug!(id = self.id, backlog = self.backlog.len(), "response done");
        }
        Ok(())
    }

    fn opening_preamble(&self) -> Result<usize> {
        // flags, code, tracing, headers, checksum type
        Ok(1 + 1 + TRACING_SIZE + self.config.headers.length1()? + 1)
    }

    /// Splits `parts` into frames no larger than `max_body_size`.
    ///
    /// The last chunk of a frame with more fragments continues as the first
    /// chunk of the next, so an argument that ends exactly on a frame
    /// boundary is closed by an empty chunk at the start of the next frame.
    fn fragment(&self, parts: Vec<Bytes>, is_last: bool, opening: bool) -> Result<Vec<Frame>> {
        let max = self.config.max_body_size;
        let preamble = if opening {
            self.opening_preamble()?
        } else {
            CONT_PREAMBLE
        };
        if preamble + CHUNK_PREFIX > max {
            return Err(FrameError::FrameTooLarge(preamble + CHUNK_PREFIX).into());
        }

        let mut frames = Vec::new();
        let mut opening = opening;
        let mut args: Vec<Bytes> = Vec::new();
        let mut space = max - preamble;

        for part in parts {
            let mut rest = part;
            loop {
                if space < CHUNK_PREFIX {
                    frames.push(self.build(opening, std::mem::take(&mut args), true));
                    opening = false;
                    args.push(Bytes::new());
                    space = max - CONT_PREAMBLE - CHUNK_PREFIX;
                }
                if CHUNK_PREFIX + rest.len() <= space {
                    space -= CHUNK_PREFIX + rest.len();
                    args.push(rest);
                    break;
                }
                let head = rest.split_to(space - CHUNK_PREFIX);
                args.push(head);
                frames.push(self.build(opening, std::mem::take(&mut args), true));
                opening = false;
                space = max - CONT_PREAMBLE;
            }
        }
        frames.push(self.build(opening, args, !is_last));

        if frames.len() > 1 {
            debug!(id = self.id, frames = frames.len(), max, "fragmented response parts");
        }
        Ok(frames)
    }

    fn build(&self, opening: bool, args: Vec<Bytes>, more: bool) -> Frame {
        let flags = if more { flags::MORE_FRAGMENTS } else { 0 };
        let body = if opening {
            Body::CallResponse(CallResponse {
                flags,
                code: self.code,
                tracing: self.tracing(),
                headers: self.config.headers.clone(),
                checksum: Checksum::default(),
                args,
            })
        } else {
            Body::CallResponseCont(CallCont {
                flags,
                checksum: Checksum::default(),
                args,
            })
        };
        Frame::new(self.id, body)
    }

    fn enqueue(&mut self, frame: Frame) -> Result<()> {
        match &self.credits {
            Some(credits) if !self.backlog.is_empty() || !credits.try_consume() => {
                trace!(id = self.id, backlog = self.backlog.len() + 1, "frame parked for credit");
                self.backlog.push_back(frame);
                Ok(())
            }
            _ => self.transmit(frame),
        }
    }

    fn transmit(&self, frame: Frame) -> Result<()> {
        self.frames
            .send(frame)
            .map_err(|_| ResponseError::ChannelClosed)
    }

    /// Grants credit and sends as much of the backlog as it covers.
    /// Returns the number of frames sent.
    pub fn on_drain(&mut self, granted: u32) -> Result<usize> {
        let Some(credits) = self.credits.clone() else {
            return Ok(0);
        };
        credits.grant(granted);

        let mut sent = 0;
        while !self.backlog.is_empty() && credits.try_consume() {
            if let Some(frame) = self.backlog.pop_front() {
                if let Err(err) = self.transmit(frame) {
                    self.fail_transport();
                    return Err(err);
                }
                sent += 1;
            }
        }
        trace!(id = self.id, sent, backlog = self.backlog.len(), "drained");
        Ok(sent)
    }

    /// The frame channel is gone: nothing more can be sent, so the response
    /// ends in `Error` unless it already completed.
    fn fail_transport(&mut self) {
        if !self.state.is_terminal() {
            self.state = ResponseState::Error;
        }
        debug!(
            id = self.id,
            state = %self.state,
            discarded = self.backlog.len(),
            "frame channel closed"
        );
        self.backlog.clear();
        self.finish();
    }

    /// Replaces the normal completion with an error frame.
    ///
    /// Frames still waiting for credit are discarded; the error frame itself
    /// is sent without credit.
    pub fn send_error(&mut self, code: ErrorCode, message: &str) -> Result<()> {
        self.ensure_open(&format!("send error frame: {code}: {message}"))?;
        if let Some(span) = self.span.as_mut() {
            span.annotate(SERVER_SEND);
        }
        self.state = ResponseState::Error;
        if !self.backlog.is_empty() {
            debug!(id = self.id, discarded = self.backlog.len(), "discarding parked frames");
            self.backlog.clear();
        }

        debug!(id = self.id, code = %code, reason = message, "sending error frame");
        let body = ErrorResponse::new(code, self.tracing(), message);
        let sent = self.transmit(Frame::new(self.id, Body::error_response(body)));

        self.emit(ResponseEvent::Errored {
            code,
            message: message.to_string(),
        });
        self.finish();
        sent
    }

    /// Emits [`ResponseEvent::Finished`] once the response is terminal.
    pub fn finish(&mut self) {
        if self.state.is_terminal() && !self.finished {
            self.finished = true;
            self.emit(ResponseEvent::Finished);
        }
    }

    fn emit(&self, event: ResponseEvent) {
        let _ = self.events.send(event);
    }
}

/// A response whose arguments are written incrementally.
#[derive(Debug)]
pub struct StreamingOutResponse {
    core: ResponseCore,
    args: OutArgStream,
    arg_events: mpsc::UnboundedReceiver<ArgEvent>,
}

impl StreamingOutResponse {
    pub fn new(
        id: u32,
        config: ResponseConfig,
        frames: mpsc::UnboundedSender<Frame>,
        events: mpsc::UnboundedSender<ResponseEvent>,
    ) -> Result<Self> {
        let core = ResponseCore::new(id, config, frames, events)?;
        let (args, arg_events) = OutArgStream::new();
        Ok(Self {
            core,
            args,
            arg_events,
        })
    }

    pub fn with_span(mut self, span: Box<dyn Span>) -> Self {
        self.core.set_span(span);
        self
    }

    pub fn with_credits(mut self, credits: CreditTracker) -> Self {
        self.core.set_credits(credits);
        self
    }

    pub fn id(&self) -> u32 {
        self.core.id()
    }

    pub fn state(&self) -> ResponseState {
        self.core.state()
    }

    pub fn code(&self) -> u8 {
        self.core.code()
    }

    pub fn is_writable(&self) -> bool {
        self.core.is_writable()
    }

    pub fn backlog_len(&self) -> usize {
        self.core.backlog_len()
    }

    /// Sets the status (`true` = ok) and closes arg1.
    pub fn set_ok(&mut self, ok: bool) -> Result<()> {
        self.core.set_ok(ok)?;
        self.args.end(ArgIndex::Arg1);
        self.args.flush();
        self.pump()
    }

    /// Writes a chunk to arg2 or arg3 and flushes it.
    pub fn write(&mut self, arg: ArgIndex, chunk: &[u8]) -> Result<()> {
        if arg == ArgIndex::Arg1 {
            return Err(ResponseError::Arg1Reserved);
        }
        self.core.ensure_open(&format!("write {arg}"))?;
        self.args.write(arg, chunk);
        self.args.flush();
        self.pump()
    }

    /// Ends arg2 or arg3. Ending arg3 completes the response.
    pub fn end(&mut self, arg: ArgIndex) -> Result<()> {
        if arg == ArgIndex::Arg1 {
            return Err(ResponseError::Arg1Reserved);
        }
        self.core.ensure_open(&format!("end {arg}"))?;
        self.args.end(arg);
        self.args.flush();
        self.pump()
    }

    /// Writes and ends both arg2 and arg3 in one batch.
    pub fn send(&mut self, arg2: &[u8], arg3: &[u8]) -> Result<()> {
        self.core.ensure_open("send response")?;
        self.args.write(ArgIndex::Arg2, arg2);
        self.args.end(ArgIndex::Arg2);
        self.args.write(ArgIndex::Arg3, arg3);
        self.args.end(ArgIndex::Arg3);
        self.pump()
    }

    /// Fails the response: ends all three arguments regardless of what was
    /// buffered and sends an error frame instead of the normal completion.
    pub fn send_error(&mut self, code: ErrorCode, message: &str) -> Result<()> {
        self.core
            .ensure_open(&format!("send error frame: {code}: {message}"))?;
        self.args.finish_all();
        // every public entry point pumps before returning
        debug_assert!(self.arg_events.is_empty());
        self.core.send_error(code, message)
    }

    /// See [`ResponseCore::on_drain`].
    pub fn on_drain(&mut self, granted: u32) -> Result<usize> {
        let sent = self.core.on_drain(granted);
        if self.core.state() == ResponseState::Error {
            self.args.finish_all();
        }
        sent
    }

    /// Forwards every queued argument event, then reports the first failure.
    fn pump(&mut self) -> Result<()> {
        let mut first_err = None;
        while let Ok(event) = self.arg_events.try_recv() {
            match event {
                ArgEvent::Parts { parts, is_last } => {
                    if let Err(err) = self.core.send_parts(parts, is_last) {
                        first_err.get_or_insert(err);
                    }
                }
                ArgEvent::Error(err) => {
                    self.core.emit(ResponseEvent::ArgError(err.clone()));
                    first_err.get_or_insert(ResponseError::ArgStream(err));
                }
                ArgEvent::Finish => self.core.finish(),
            }
        }
        if self.core.state() == ResponseState::Error {
            self.args.finish_all();
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Harness {
        frames: mpsc::UnboundedReceiver<Frame>,
        events: mpsc::UnboundedReceiver<ResponseEvent>,
    }

    impl Harness {
        fn frames(&mut self) -> Vec<Frame> {
            let mut out = Vec::new();
            while let Ok(frame) = self.frames.try_recv() {
                out.push(frame);
            }
            out
        }

        fn events(&mut self) -> Vec<ResponseEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn response(config: ResponseConfig) -> (StreamingOutResponse, Harness) {
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let res = StreamingOutResponse::new(7, config, frames_tx, events_tx).unwrap();
        (res, Harness { frames, events })
    }

    #[derive(Clone, Default)]
    struct RecordingSpan(Arc<Mutex<Vec<String>>>);

    impl Span for RecordingSpan {
        fn annotate(&mut self, label: &str) {
            self.0.lock().unwrap().push(label.to_string());
        }

        fn tracing(&self) -> Tracing {
            Tracing::from_bytes([0x42; TRACING_SIZE])
        }
    }

    fn call_args(frame: &Frame) -> (&[Bytes], u8) {
        match frame.body.as_ref().unwrap() {
            Body::CallResponse(res) => (res.args.as_slice(), res.flags),
            Body::CallResponseCont(cont) => (cont.args.as_slice(), cont.flags),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    /// Reassembles the arguments of a frame sequence: the first chunk of each
    /// frame continues the previous frame's last argument.
    fn reassemble(frames: &[Frame]) -> Vec<Vec<u8>> {
        let mut args: Vec<Vec<u8>> = vec![Vec::new()];
        for frame in frames {
            let (chunks, _) = call_args(frame);
            for (j, chunk) in chunks.iter().enumerate() {
                if j > 0 {
                    args.push(Vec::new());
                }
                args.last_mut().unwrap().extend_from_slice(chunk);
            }
        }
        args
    }

    #[test]
    fn test_set_ok_then_second_set_ok_fails() {
        let (mut res, mut harness) = response(ResponseConfig::default());
        res.set_ok(true).unwrap();
        assert_ne!(res.state(), ResponseState::Initial);

        let err = res.set_ok(false).unwrap_err();
        assert_eq!(
            err,
            ResponseError::AlreadyStarted {
                state: ResponseState::Started
            }
        );
        assert_eq!(res.code(), CallResponse::OK);

        let frames = harness.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), Some(skein_core::FrameType::CallResponse));
    }

    #[test]
    fn test_send_error_ends_arguments_once() {
        let span = RecordingSpan::default();
        let (res, mut harness) = response(ResponseConfig::default());
        let mut res = res.with_span(Box::new(span.clone()));

        res.set_ok(true).unwrap();
        res.write(ArgIndex::Arg2, b"partial").unwrap();
        let code: ErrorCode = "Busy".parse().unwrap();
        res.send_error(code, "overloaded").unwrap();
        assert_eq!(res.state(), ResponseState::Error);

        let frames = harness.frames();
        let last = frames.last().unwrap();
        match last.body.as_ref().unwrap() {
            Body::ErrorResponse(body) => {
                assert_eq!(body.code, ErrorCode::Busy);
                assert_eq!(body.message, "overloaded");
                assert_eq!(body.tracing, Tracing::from_bytes([0x42; TRACING_SIZE]));
            }
            other => panic!("unexpected body: {other:?}"),
        }
        assert_eq!(last.id, 7);

        assert_eq!(
            harness.events(),
            vec![
                ResponseEvent::Errored {
                    code: ErrorCode::Busy,
                    message: "overloaded".to_string()
                },
                ResponseEvent::Finished,
            ]
        );
        assert!(span.0.lock().unwrap().iter().any(|label| label == SERVER_SEND));

        let err = res.send_error(ErrorCode::Timeout, "late").unwrap_err();
        assert!(matches!(err, ResponseError::AlreadyDone { .. }));
        assert!(matches!(
            res.write(ArgIndex::Arg3, b"more").unwrap_err(),
            ResponseError::AlreadyDone { .. }
        ));
        assert!(harness.frames().is_empty());
        assert!(harness.events().is_empty());
    }

    #[test]
    fn test_send_error_from_initial() {
        let (mut res, mut harness) = response(ResponseConfig::default());
        res.send_error(ErrorCode::Declined, "").unwrap();

        let frames = harness.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), Some(skein_core::FrameType::ErrorResponse));
        assert_eq!(harness.events().last(), Some(&ResponseEvent::Finished));
    }

    #[test]
    fn test_set_ok_then_send() {
        let (mut res, mut harness) = response(ResponseConfig::new().header("as", "raw"));
        res.set_ok(false).unwrap();
        res.send(b"{}", b"payload").unwrap();
        assert_eq!(res.state(), ResponseState::Done);

        let frames = harness.frames();
        assert_eq!(frames.len(), 2);
        match frames[0].body.as_ref().unwrap() {
            Body::CallResponse(first) => {
                assert_eq!(first.code, CallResponse::NOT_OK);
                assert_eq!(first.headers.get("as"), Some("raw"));
                assert!(first.has_more_fragments());
            }
            other => panic!("unexpected body: {other:?}"),
        }
        let (_, last_flags) = call_args(&frames[1]);
        assert_eq!(last_flags & flags::MORE_FRAGMENTS, 0);

        assert_eq!(
            reassemble(&frames),
            vec![b"".to_vec(), b"{}".to_vec(), b"payload".to_vec()]
        );
        assert_eq!(harness.events(), vec![ResponseEvent::Finished]);
    }

    #[test]
    fn test_arg1_is_reserved() {
        let (mut res, _harness) = response(ResponseConfig::default());
        assert_eq!(
            res.write(ArgIndex::Arg1, b"x").unwrap_err(),
            ResponseError::Arg1Reserved
        );
        assert_eq!(
            res.end(ArgIndex::Arg1).unwrap_err(),
            ResponseError::Arg1Reserved
        );
        assert_eq!(res.state(), ResponseState::Initial);
    }

    #[test]
    fn test_large_argument_is_fragmented() {
        let max = 64;
        let (mut res, mut harness) = response(ResponseConfig::new().max_body_size(max));
        let payload: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        res.send(b"", &payload).unwrap();

        let frames = harness.frames();
        assert!(frames.len() > 3);
        for (i, frame) in frames.iter().enumerate() {
            let body_len = frame.body.as_ref().unwrap().byte_length().unwrap();
            assert!(body_len <= max, "frame {i} body is {body_len} bytes");
            let (_, frame_flags) = call_args(frame);
            let more = frame_flags & flags::MORE_FRAGMENTS != 0;
            assert_eq!(more, i + 1 < frames.len());
        }
        assert_eq!(frames[0].frame_type(), Some(skein_core::FrameType::CallResponse));
        assert!(frames[1..]
            .iter()
            .all(|f| f.frame_type() == Some(skein_core::FrameType::CallResponseCont)));

        assert_eq!(reassemble(&frames), vec![Vec::new(), Vec::new(), payload]);
    }

    #[test]
    fn test_argument_ending_on_frame_boundary() {
        // first frame: 29 preamble + (2 + 0) arg1 + (2 + 31) arg2 = 64
        let (mut res, mut harness) = response(ResponseConfig::new().max_body_size(64));
        let arg2 = vec![b'h'; 31];
        res.send(&arg2, b"tail").unwrap();

        let frames = harness.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].body.as_ref().unwrap().byte_length().unwrap(), 64);
        let (chunks, _) = call_args(&frames[1]);
        assert!(chunks[0].is_empty());
        assert_eq!(chunks[1], Bytes::from_static(b"tail"));

        assert_eq!(reassemble(&frames), vec![Vec::new(), arg2, b"tail".to_vec()]);
    }

    #[test]
    fn test_streamed_writes_continue_across_frames() {
        let (mut res, mut harness) = response(ResponseConfig::default());
        res.set_ok(true).unwrap();
        res.write(ArgIndex::Arg2, b"k=v").unwrap();
        res.end(ArgIndex::Arg2).unwrap();
        res.write(ArgIndex::Arg3, b"hello ").unwrap();
        res.write(ArgIndex::Arg3, b"world").unwrap();
        assert_eq!(res.state(), ResponseState::Started);
        res.end(ArgIndex::Arg3).unwrap();
        assert_eq!(res.state(), ResponseState::Done);

        let frames = harness.frames();
        assert_eq!(
            reassemble(&frames),
            vec![Vec::new(), b"k=v".to_vec(), b"hello world".to_vec()]
        );
        assert_eq!(harness.events(), vec![ResponseEvent::Finished]);
    }

    #[test]
    fn test_out_of_order_write_is_reported() {
        let (mut res, mut harness) = response(ResponseConfig::default());
        res.write(ArgIndex::Arg3, b"body").unwrap();
        let err = res.write(ArgIndex::Arg2, b"late").unwrap_err();
        assert_eq!(
            err,
            ResponseError::ArgStream(ArgStreamError::WriteAfterEnd {
                arg: ArgIndex::Arg2
            })
        );
        assert_eq!(
            harness.events(),
            vec![ResponseEvent::ArgError(ArgStreamError::WriteAfterEnd {
                arg: ArgIndex::Arg2
            })]
        );
    }

    #[test]
    fn test_credits_park_and_drain() {
        let (mut res, mut harness) =
            response(ResponseConfig::new().max_body_size(64).initial_credits(1));
        let payload = vec![0u8; 150];
        res.send(b"", &payload).unwrap();

        let sent = harness.frames();
        assert_eq!(sent.len(), 1);
        let parked = res.backlog_len();
        assert!(parked > 0);
        assert!(!res.is_writable());
        assert_eq!(res.state(), ResponseState::Done);

        assert_eq!(res.on_drain(1).unwrap(), 1);
        assert_eq!(res.backlog_len(), parked - 1);
        assert_eq!(res.on_drain(100).unwrap(), parked - 1);
        assert!(res.is_writable());

        let mut frames = sent;
        frames.extend(harness.frames());
        assert_eq!(reassemble(&frames), vec![Vec::new(), Vec::new(), payload]);
    }

    #[test]
    fn test_send_error_discards_backlog() {
        let (mut res, mut harness) =
            response(ResponseConfig::new().max_body_size(64).initial_credits(0));
        res.set_ok(true).unwrap();
        res.write(ArgIndex::Arg3, &[1u8; 100]).unwrap();
        assert!(res.backlog_len() > 0);
        assert!(harness.frames().is_empty());

        res.send_error(ErrorCode::Unhealthy, "draining").unwrap();
        assert_eq!(res.backlog_len(), 0);
        let frames = harness.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), Some(skein_core::FrameType::ErrorResponse));
    }

    #[test]
    fn test_closed_frame_channel_ends_in_error() {
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut res =
            StreamingOutResponse::new(3, ResponseConfig::default(), frames_tx, events_tx).unwrap();
        drop(frames);

        assert_eq!(
            res.send(b"", b"x").unwrap_err(),
            ResponseError::ChannelClosed
        );
        assert!(res.state().is_terminal());
        assert_eq!(res.state(), ResponseState::Error);

        assert!(matches!(
            res.end(ArgIndex::Arg3).unwrap_err(),
            ResponseError::AlreadyDone { .. }
        ));
        assert!(matches!(
            res.send_error(ErrorCode::UnexpectedError, "gone").unwrap_err(),
            ResponseError::AlreadyDone { .. }
        ));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen, vec![ResponseEvent::Finished]);
    }

    #[test]
    fn test_closed_frame_channel_while_draining() {
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let config = ResponseConfig::new().max_body_size(64).initial_credits(0);
        let mut res = StreamingOutResponse::new(4, config, frames_tx, events_tx).unwrap();

        res.set_ok(true).unwrap();
        res.write(ArgIndex::Arg3, &[5u8; 100]).unwrap();
        assert!(res.backlog_len() > 0);
        drop(frames);

        assert_eq!(res.on_drain(10).unwrap_err(), ResponseError::ChannelClosed);
        assert_eq!(res.state(), ResponseState::Error);
        assert_eq!(res.backlog_len(), 0);
        assert_eq!(events.try_recv().unwrap(), ResponseEvent::Finished);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_out_of_range_body_size_is_rejected() {
        let (frames_tx, _frames) = mpsc::unbounded_channel();
        let (events_tx, _events) = mpsc::unbounded_channel();
        let config = ResponseConfig::new().max_body_size(100_000);
        let err = StreamingOutResponse::new(5, config, frames_tx, events_tx).unwrap_err();
        assert!(matches!(err, ResponseError::Config(_)));

        let (frames_tx, _frames) = mpsc::unbounded_channel();
        let (events_tx, _events) = mpsc::unbounded_channel();
        let config = ResponseConfig::new().max_body_size(16);
        let err = ResponseCore::new(5, config, frames_tx, events_tx).unwrap_err();
        assert!(matches!(err, ResponseError::Config(_)));
    }

    #[tokio::test]
    async fn test_events_reach_async_listener() {
        let (frames_tx, _frames) = mpsc::unbounded_channel();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut res =
            StreamingOutResponse::new(1, ResponseConfig::default(), frames_tx, events_tx).unwrap();

        let listener = tokio::spawn(async move { events.recv().await });
        res.send(b"", b"done").unwrap();
        assert_eq!(listener.await.unwrap(), Some(ResponseEvent::Finished));
    }
}
