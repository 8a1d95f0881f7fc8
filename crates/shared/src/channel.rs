use tokio::sync::oneshot;

use crate::protocol::{MirrorReply, MirrorRequest};

/// One outbound request travelling to the authority with its reply slot.
#[derive(Debug)]
pub struct AuthorityCall {
    pub request: MirrorRequest,
    pub reply: oneshot::Sender<MirrorReply>,
}

impl AuthorityCall {
    pub fn new(request: MirrorRequest) -> (Self, oneshot::Receiver<MirrorReply>) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }
}
