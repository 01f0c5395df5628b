//! Command dispatch
//!
//! The wire protocol carries no correlation identifier, so command and reply
//! must strictly alternate per device. The dispatcher enforces that rule: it
//! tracks whether a command is outstanding, refuses a second send unless the
//! caller explicitly forces it, and assembles reply frames from whatever the
//! transport has buffered.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::frame::{ReplyFrame, REPLY_FRAME_LEN};
use super::transport::Transport;
use crate::error::{Error, TransportError, UsageError};

/// Sleep between non-blocking read attempts inside the wait loop.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Dispatcher state: either idle or tracking one in-flight command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No command outstanding.
    Idle,
    /// A command was written and its reply has not yet been consumed.
    AwaitingReply {
        /// When the command was written.
        sent_at: Instant,
    },
}

/// Per-device command/reply state machine over a [`Transport`].
#[derive(Debug)]
pub struct Dispatcher<T: Transport> {
    transport: T,
    state: DispatcherState,
    /// Reply bytes accumulated so far (a frame may arrive in pieces).
    rx: Vec<u8>,
}

impl<T: Transport> Dispatcher<T> {
    /// Create an idle dispatcher over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: DispatcherState::Idle,
            rx: Vec::with_capacity(REPLY_FRAME_LEN),
        }
    }

    /// Current state.
    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Whether a command is outstanding.
    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, DispatcherState::AwaitingReply { .. })
    }

    /// Borrow the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Write a command frame and start tracking its reply.
    ///
    /// Fails with [`UsageError::CommandInFlight`], before any I/O, if the
    /// previous command's reply has not been consumed: with no correlation
    /// identifier on the wire there is no way to disambiguate two
    /// outstanding replies.
    pub fn send(&mut self, frame: &[u8]) -> Result<(), Error> {
        if self.is_awaiting() {
            return Err(UsageError::CommandInFlight.into());
        }
        self.write_frame(frame)
    }

    /// Write a command frame regardless of state.
    ///
    /// Tracking of the previous reply is abandoned and `sent_at` is reset to
    /// this command. The caller is responsible for draining the stale reply
    /// separately (see the halt discipline in the device layer).
    pub fn send_forced(&mut self, frame: &[u8]) -> Result<(), Error> {
        if self.is_awaiting() {
            warn!("forced send while a reply is outstanding; previous reply must be drained");
        }
        self.write_frame(frame)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        debug!("sending (hex): {:02x?}", frame);
        self.transport.write_all(frame)?;
        self.state = DispatcherState::AwaitingReply {
            sent_at: Instant::now(),
        };
        Ok(())
    }

    /// Non-blocking completion check for the outstanding command.
    ///
    /// Reads whatever bytes are currently available; if a full reply frame
    /// has accumulated it is consumed, the dispatcher returns to idle, and
    /// the decoded frame is returned. Otherwise returns `None` and the
    /// command stays outstanding.
    pub fn poll(&mut self) -> Result<Option<ReplyFrame>, Error> {
        if !self.is_awaiting() {
            return Err(UsageError::NoCommandInFlight.into());
        }
        match self.take_frame()? {
            None => Ok(None),
            Some(result) => {
                // Decode failures consume the frame too; only the bytes'
                // absence keeps the command outstanding.
                self.state = DispatcherState::Idle;
                let frame = result?;
                Ok(Some(frame))
            }
        }
    }

    /// Block until the outstanding command's reply arrives or `timeout` has
    /// elapsed since the command was sent.
    ///
    /// On timeout fails with [`TransportError::ReplyTimeout`] and the
    /// dispatcher **remains** awaiting: no state is lost and a later call
    /// can still pick up the reply. The read step runs before the deadline
    /// check so a retry succeeds as soon as the bytes have arrived.
    pub fn wait(&mut self, timeout: Duration) -> Result<ReplyFrame, Error> {
        let sent_at = match self.state {
            DispatcherState::AwaitingReply { sent_at } => sent_at,
            DispatcherState::Idle => return Err(UsageError::NoCommandInFlight.into()),
        };
        loop {
            if let Some(result) = self.take_frame()? {
                self.state = DispatcherState::Idle;
                return result.map_err(Error::from);
            }
            if sent_at.elapsed() > timeout {
                return Err(TransportError::ReplyTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Block until any reply frame arrives, regardless of dispatcher state.
    ///
    /// Used to drain a reply whose command is no longer tracked (a stale
    /// reply after a forced send, or the forced command's own reply once the
    /// stale one has been consumed). The timeout is measured from this call.
    pub fn wait_forced(&mut self, timeout: Duration) -> Result<ReplyFrame, Error> {
        let start = Instant::now();
        loop {
            if let Some(result) = self.take_frame()? {
                self.state = DispatcherState::Idle;
                return result.map_err(Error::from);
            }
            if start.elapsed() > timeout {
                return Err(TransportError::ReplyTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Pull available bytes off the transport; if a full reply frame has
    /// accumulated, remove and decode it.
    fn take_frame(&mut self) -> Result<Option<Result<ReplyFrame, crate::error::ProtocolError>>, Error> {
        self.transport.read_available(&mut self.rx)?;
        if self.rx.len() < REPLY_FRAME_LEN {
            return Ok(None);
        }
        let raw: Vec<u8> = self.rx.drain(..REPLY_FRAME_LEN).collect();
        debug!("reply (hex): {:02x?}", raw);
        Ok(Some(ReplyFrame::from_bytes(&raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::frame::{CommandFrame, ReplyStatus};

    /// Scripted transport: records writes, serves reads from a queue.
    struct ScriptedTransport {
        written: Vec<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                written: Vec::new(),
                pending: Vec::new(),
            }
        }

        fn push_reply(&mut self, status: ReplyStatus, parameter: u16) {
            let frame = ReplyFrame {
                address: 0x01,
                status: status.code(),
                parameter,
            };
            self.pending.extend_from_slice(&frame.to_bytes());
        }
    }

    impl Transport for ScriptedTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
            let n = self.pending.len();
            buf.append(&mut self.pending);
            Ok(n)
        }
    }

    fn cmd() -> [u8; 8] {
        CommandFrame::new(0x01, 0x66, 0).to_bytes()
    }

    #[test]
    fn test_send_then_wait() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();
        assert!(dispatcher.is_awaiting());

        dispatcher.transport_mut().push_reply(ReplyStatus::Normal, 42);
        let reply = dispatcher.wait(Duration::from_millis(50)).unwrap();
        assert_eq!(reply.parameter, 42);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[test]
    fn test_second_send_rejected() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();
        let err = dispatcher.send(&cmd()).unwrap_err();
        assert!(matches!(
            err,
            Error::Usage(UsageError::CommandInFlight)
        ));
        // The refused send never reached the transport.
        assert_eq!(dispatcher.transport_mut().written.len(), 1);
    }

    #[test]
    fn test_forced_send_resets_tracking() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();
        let first_sent_at = match dispatcher.state() {
            DispatcherState::AwaitingReply { sent_at } => sent_at,
            _ => panic!("expected awaiting state"),
        };
        std::thread::sleep(Duration::from_millis(2));
        dispatcher.send_forced(&cmd()).unwrap();
        match dispatcher.state() {
            DispatcherState::AwaitingReply { sent_at } => assert!(sent_at > first_sent_at),
            _ => panic!("expected awaiting state"),
        }
        assert_eq!(dispatcher.transport_mut().written.len(), 2);
    }

    #[test]
    fn test_poll_not_yet() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();
        assert!(dispatcher.poll().unwrap().is_none());
        assert!(dispatcher.is_awaiting());

        dispatcher.transport_mut().push_reply(ReplyStatus::Normal, 7);
        let reply = dispatcher.poll().unwrap().expect("reply should be ready");
        assert_eq!(reply.parameter, 7);
        assert!(!dispatcher.is_awaiting());
    }

    #[test]
    fn test_poll_without_command() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        assert!(matches!(
            dispatcher.poll().unwrap_err(),
            Error::Usage(UsageError::NoCommandInFlight)
        ));
    }

    #[test]
    fn test_timeout_retains_state() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();

        let err = dispatcher.wait(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::ReplyTimeout { .. })
        ));
        assert!(dispatcher.is_awaiting());

        // The reply shows up later; a retried wait still succeeds even
        // though the original deadline has long passed.
        dispatcher.transport_mut().push_reply(ReplyStatus::Normal, 9);
        let reply = dispatcher.wait(Duration::from_millis(5)).unwrap();
        assert_eq!(reply.parameter, 9);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[test]
    fn test_partial_frame_then_completion() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();

        let full = ReplyFrame {
            address: 0x01,
            status: 0,
            parameter: 500,
        }
        .to_bytes();
        dispatcher
            .transport_mut()
            .pending
            .extend_from_slice(&full[..5]);
        assert!(dispatcher.poll().unwrap().is_none());

        dispatcher
            .transport_mut()
            .pending
            .extend_from_slice(&full[5..]);
        let reply = dispatcher.poll().unwrap().unwrap();
        assert_eq!(reply.parameter, 500);
    }

    #[test]
    fn test_garbage_reply_consumed() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.send(&cmd()).unwrap();

        let mut bytes = ReplyFrame {
            address: 0x01,
            status: 0,
            parameter: 1,
        }
        .to_bytes();
        bytes[4] ^= 0x55; // corrupt without touching the checksum
        dispatcher.transport_mut().pending.extend_from_slice(&bytes);

        let err = dispatcher.wait(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ChecksumMismatch { .. })
        ));
        // The malformed reply was still consumed.
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[test]
    fn test_wait_forced_from_idle() {
        let mut dispatcher = Dispatcher::new(ScriptedTransport::new());
        dispatcher.transport_mut().push_reply(ReplyStatus::Normal, 3);
        let reply = dispatcher.wait_forced(Duration::from_millis(10)).unwrap();
        assert_eq!(reply.parameter, 3);
    }
}
