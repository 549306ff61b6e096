//! The streaming kernel: turns a lazy, finite, non-restartable sequence of
//! upstream events in one protocol into bytes written into a caller-owned
//! sink in a (possibly different) destination protocol's SSE dialect.
//!
//! Parsing an upstream event into `Increment`s is the only protocol-specific
//! part of the read side (see `anthropic::increments_from_event` and its O/G
//! counterparts); every destination `Framer` consumes the same increment
//! stream, so adding a protocol only means writing one source parser and one
//! `Framer` impl, not nine pairwise translators.

pub mod anthropic;
pub mod google;
pub mod increment;
pub mod openai;
pub mod sink;
pub mod state;

use crate::error::{KernelError, Result};
use increment::Increment;
use sink::FrameSink;

/// A destination protocol's streaming emitter. `start`/`finalize` bracket a
/// run of `handle` calls, one per increment the source produced.
/// `finalize` must be idempotent: a `Terminal` increment triggers it
/// early, and the driver always calls it again on the way out.
pub trait Framer {
    fn start(&mut self, model: &str, sink: &mut dyn FrameSink) -> Result<()>;
    fn handle(&mut self, increment: Increment, sink: &mut dyn FrameSink) -> Result<()>;
    fn error(&mut self, err: &KernelError, sink: &mut dyn FrameSink) -> Result<()>;
    fn finalize(&mut self, sink: &mut dyn FrameSink) -> Result<()>;
}

/// Drive one upstream event iterator through `to_increments` and `framer`
/// until the iterator is exhausted, a terminal increment is produced, or an
/// upstream error arrives. The upstream is dropped (and with it, whatever
/// connection it owns) as soon as this function returns, on every path.
pub fn drive<E>(
    model: &str,
    upstream: impl Iterator<Item = std::result::Result<E, KernelError>>,
    mut to_increments: impl FnMut(E) -> Result<Vec<Increment>>,
    framer: &mut dyn Framer,
    sink: &mut dyn FrameSink,
) -> Result<()> {
    // §7: an internal panic is caught here, at the top of the streaming
    // kernel, downgraded to a best-effort error frame, and the stream is
    // still closed via `finalize`. `AssertUnwindSafe` is warranted: on the
    // panic path every value this closure touches is discarded immediately
    // afterward, so no caller ever observes a torn intermediate state.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        framer.start(model, sink)?;

        for item in upstream {
            let event = match item {
                Ok(event) => event,
                Err(err) => {
                    framer.error(&err, sink)?;
                    return framer.finalize(sink);
                }
            };

            let increments = match to_increments(event) {
                Ok(increments) => increments,
                Err(err) => {
                    framer.error(&err, sink)?;
                    return framer.finalize(sink);
                }
            };

            let mut saw_terminal = false;
            for increment in increments {
                saw_terminal |= matches!(increment, Increment::Terminal { .. });
                framer.handle(increment, sink)?;
            }

            if saw_terminal {
                // §4.5 step 6: a terminal chunk finalizes and returns without
                // consuming any further upstream events, even if the
                // (possibly malformed) upstream keeps yielding items after it.
                return framer.finalize(sink);
            }
        }

        framer.finalize(sink)
    }));

    match outcome {
        Ok(result) => result,
        Err(_) => {
            let err = KernelError::Internal("panic while processing the upstream stream".into());
            let _ = framer.error(&err, sink);
            framer.finalize(sink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::StopReason;
    use sink::VecSink;

    struct RecordingFramer {
        started: bool,
        handled: Vec<Increment>,
        finalized: bool,
    }

    impl Framer for RecordingFramer {
        fn start(&mut self, _model: &str, _sink: &mut dyn FrameSink) -> Result<()> {
            self.started = true;
            Ok(())
        }
        fn handle(&mut self, increment: Increment, _sink: &mut dyn FrameSink) -> Result<()> {
            self.handled.push(increment);
            Ok(())
        }
        fn error(&mut self, _err: &KernelError, _sink: &mut dyn FrameSink) -> Result<()> {
            Ok(())
        }
        fn finalize(&mut self, _sink: &mut dyn FrameSink) -> Result<()> {
            self.finalized = true;
            Ok(())
        }
    }

    #[test]
    fn drive_starts_handles_and_finalizes_even_with_no_events() {
        let mut framer = RecordingFramer { started: false, handled: Vec::new(), finalized: false };
        let mut sink = VecSink::default();
        let upstream: Vec<std::result::Result<u8, KernelError>> = vec![];
        drive("m", upstream.into_iter(), |_| Ok(Vec::new()), &mut framer, &mut sink).unwrap();
        assert!(framer.started);
        assert!(framer.finalized);
    }

    #[test]
    fn drive_stops_consuming_after_an_upstream_error() {
        let mut framer = RecordingFramer { started: false, handled: Vec::new(), finalized: false };
        let mut sink = VecSink::default();
        let upstream: Vec<std::result::Result<u8, KernelError>> =
            vec![Ok(1), Err(KernelError::UpstreamTransport("connection reset".into())), Ok(2)];
        drive(
            "m",
            upstream.into_iter(),
            |n| Ok(vec![Increment::Text(n.to_string())]),
            &mut framer,
            &mut sink,
        )
        .unwrap();
        assert_eq!(framer.handled, vec![Increment::Text("1".into())]);
        assert!(framer.finalized);
    }

    #[test]
    fn terminal_increment_does_not_stop_the_driver_from_finalizing_again_safely() {
        let mut framer = RecordingFramer { started: false, handled: Vec::new(), finalized: false };
        let mut sink = VecSink::default();
        let upstream: Vec<std::result::Result<u8, KernelError>> = vec![Ok(1)];
        drive(
            "m",
            upstream.into_iter(),
            |_| Ok(vec![Increment::Terminal { stop_reason: StopReason::EndTurn }]),
            &mut framer,
            &mut sink,
        )
        .unwrap();
        assert!(framer.finalized);
    }

    #[test]
    fn terminal_increment_stops_the_driver_from_consuming_further_upstream_items() {
        let mut framer = RecordingFramer { started: false, handled: Vec::new(), finalized: false };
        let mut sink = VecSink::default();
        let upstream: Vec<std::result::Result<u8, KernelError>> = vec![Ok(1), Ok(2), Ok(3)];
        drive(
            "m",
            upstream.into_iter(),
            |n| {
                if n == 1 {
                    Ok(vec![Increment::Terminal { stop_reason: StopReason::EndTurn }])
                } else {
                    Ok(vec![Increment::Text(n.to_string())])
                }
            },
            &mut framer,
            &mut sink,
        )
        .unwrap();
        assert_eq!(framer.handled, vec![Increment::Terminal { stop_reason: StopReason::EndTurn }]);
        assert!(framer.finalized);
    }

    #[test]
    fn a_panic_mid_stream_is_caught_and_downgraded_to_an_error_frame() {
        struct PanickingFramer;
        impl Framer for PanickingFramer {
            fn start(&mut self, _model: &str, _sink: &mut dyn FrameSink) -> Result<()> {
                Ok(())
            }
            fn handle(&mut self, _increment: Increment, _sink: &mut dyn FrameSink) -> Result<()> {
                panic!("boom");
            }
            fn error(&mut self, err: &KernelError, sink: &mut dyn FrameSink) -> Result<()> {
                sink.write_and_flush(&format!("error: {}", err.kind()))
            }
            fn finalize(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
                sink.write_and_flush("finalized")
            }
        }

        let mut framer = PanickingFramer;
        let mut sink = VecSink::default();
        let upstream: Vec<std::result::Result<u8, KernelError>> = vec![Ok(1)];
        let result = drive("m", upstream.into_iter(), |n| Ok(vec![Increment::Text(n.to_string())]), &mut framer, &mut sink);
        assert!(result.is_ok());
        assert!(sink.joined().contains("error: internal"));
        assert!(sink.joined().contains("finalized"));
    }
}
