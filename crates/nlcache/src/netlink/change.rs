//! Sending change requests, with one fallback retry.
//!
//! Some kernels reject a request with `EOPNOTSUPP` when it is sent with the
//! create message type but accept the same payload with the set type (bridge
//! VLAN membership through `RTM_NEWLINK` vs `RTM_SETLINK` is the usual case).
//! A [`ChangeRequest`] carries the fallback type and retries exactly once.

use tracing::debug;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::NlMsgType;
use super::transport::{Transport, send_auto, wait_for_ack};

/// Progress of [`ChangeRequest::execute`].
#[derive(Debug)]
enum ChangeState {
    Build,
    Send,
    AwaitAck(u32),
    Retry,
    Done,
    Failed(Error),
}

/// A built change request, ready to be sent.
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    builder: MessageBuilder,
    fallback: Option<u16>,
}

impl ChangeRequest {
    /// A request sent as built, without retry.
    ///
    /// The builder must not carry a sequence number; one is assigned on send.
    pub fn new(builder: MessageBuilder) -> Self {
        Self {
            builder,
            fallback: None,
        }
    }

    /// Resend once as `msg_type` if the kernel answers `EOPNOTSUPP`.
    pub fn with_fallback(mut self, msg_type: u16) -> Self {
        self.fallback = Some(msg_type);
        self
    }

    pub fn builder(&self) -> &MessageBuilder {
        &self.builder
    }

    pub fn msg_type(&self) -> u16 {
        self.builder.msg_type()
    }

    pub fn fallback(&self) -> Option<u16> {
        self.fallback
    }

    /// Send the request and wait for the kernel's ack.
    ///
    /// # Panics
    ///
    /// If the builder already carries a sequence number.
    pub fn execute<T: Transport + ?Sized>(mut self, transport: &mut T) -> Result<()> {
        let create_type = self.builder.msg_type();
        let mut retried = false;
        let mut state = ChangeState::Build;

        loop {
            state = match state {
                ChangeState::Build => {
                    assert_eq!(
                        self.builder.seq(),
                        0,
                        "request already carries sequence number {}",
                        self.builder.seq()
                    );
                    ChangeState::Send
                }
                ChangeState::Send => match send_auto(transport, &self.builder) {
                    Ok(seq) => ChangeState::AwaitAck(seq),
                    Err(e) => ChangeState::Failed(e),
                },
                ChangeState::AwaitAck(seq) => match wait_for_ack(transport, seq) {
                    Ok(()) => ChangeState::Done,
                    Err(e)
                        if e.is_not_supported()
                            && !retried
                            && self.fallback.is_some()
                            && self.builder.msg_type() == create_type =>
                    {
                        ChangeState::Retry
                    }
                    Err(e) => ChangeState::Failed(e),
                },
                ChangeState::Retry => {
                    let Some(fallback) = self.fallback else {
                        return Err(Error::NotSupported(NlMsgType::name(create_type).into()));
                    };
                    debug!(
                        from = NlMsgType::name(create_type),
                        to = NlMsgType::name(fallback),
                        "request not supported, retrying"
                    );
                    retried = true;
                    self.builder.set_msg_type(fallback);
                    ChangeState::Send
                }
                ChangeState::Done => return Ok(()),
                ChangeState::Failed(e) => return Err(e),
            };
        }
    }
}
